//! Repository scanner and intent classifier.
//!
//! Given `owner/repo`, lists the repository tree, scores how skill-focused the
//! repository is, and returns one candidate per canonically placed
//! `SKILL.md` when the repository clears the caller's minimum tier.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use skillcatalog_shared::{IntentTier, RepoIntent};

use crate::github::{GithubClient, TreeEntry};

/// Skill-related words looked for in the repository name and description.
const SKILL_KEYWORDS: &[&str] = &["skill", "skills", "claude", "agent", "prompt", "mcp", "codex"];

/// File names that mark a generic software project.
const NOISE_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "cargo.toml",
    "cargo.lock",
    "go.mod",
    "go.sum",
    "pyproject.toml",
    "poetry.lock",
    "requirements.txt",
    "setup.py",
    "gemfile",
    "gemfile.lock",
    "pom.xml",
    "build.gradle",
    "composer.json",
];

/// Top-level directories that mark a generic software project.
const NOISE_DIRS: &[&str] = &[
    "src",
    "lib",
    "app",
    "cmd",
    "pkg",
    "internal",
    "vendor",
    "node_modules",
    "tests",
];

static CANONICAL_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\.claude/)?skills/[^/]+/skill\.md$").expect("valid regex")
});

/// A skill document found in a scanned repository.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillCandidate {
    /// Path inside the repository.
    pub path: String,
    pub raw_url: String,
    pub page_url: String,
    pub sha: String,
    /// `owner/repo`.
    pub repository: String,
    pub branch: String,
    pub intent: RepoIntent,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Result of scanning one repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    /// `None` when the repository could not be listed.
    pub intent: Option<RepoIntent>,
    pub candidates: Vec<SkillCandidate>,
}

/// Per-source limits applied to a scan.
#[derive(Debug, Clone)]
pub struct ScanRules {
    pub min_tier: IntentTier,
    /// Glob patterns a canonical path must match; empty allows all.
    pub allowed_path_globs: Vec<String>,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            min_tier: IntentTier::SkillsFocused,
            allowed_path_globs: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Lists repository trees through a [`GithubClient`] and classifies them.
#[derive(Debug, Clone)]
pub struct RepoScanner {
    github: GithubClient,
}

impl RepoScanner {
    pub fn new(github: GithubClient) -> Self {
        Self { github }
    }

    pub fn github(&self) -> &GithubClient {
        &self.github
    }

    /// Scan `repository`. API failures produce an empty outcome, never an error.
    #[instrument(skip_all, fields(repository = %repository))]
    pub async fn scan(&self, repository: &str, rules: &ScanRules) -> ScanOutcome {
        let info = match self.github.repo_info(repository).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "repository metadata unavailable");
                return ScanOutcome::default();
            }
        };

        let tree = match self.github.tree(repository, &info.default_branch).await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, branch = %info.default_branch, "repository tree unavailable");
                return ScanOutcome::default();
            }
        };

        let globs: Vec<Regex> = rules
            .allowed_path_globs
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();

        let canonical: Vec<&TreeEntry> = tree
            .iter()
            .filter(|e| is_canonical_path(&e.path))
            .filter(|e| globs.is_empty() || globs.iter().any(|g| g.is_match(&e.path)))
            .collect();

        let paths: Vec<&str> = tree.iter().map(|e| e.path.as_str()).collect();
        let intent = classify(
            &paths,
            canonical.len() as u32,
            repository,
            info.description.as_deref(),
        );

        info!(
            score = intent.score,
            tier = %intent.tier,
            canonical = intent.canonical_files,
            total = intent.total_files,
            "repository classified"
        );

        if intent.tier < rules.min_tier {
            debug!(min_tier = %rules.min_tier, "below minimum tier, no candidates");
            return ScanOutcome {
                intent: Some(intent),
                candidates: Vec::new(),
            };
        }

        let branch = info.default_branch.as_str();
        let candidates = canonical
            .into_iter()
            .map(|entry| SkillCandidate {
                path: entry.path.clone(),
                raw_url: self.github.raw_url(repository, branch, &entry.path),
                page_url: self.github.page_url(repository, branch, &entry.path),
                sha: entry.sha.clone(),
                repository: repository.to_string(),
                branch: branch.to_string(),
                intent: intent.clone(),
                pushed_at: info.pushed_at,
            })
            .collect();

        ScanOutcome {
            intent: Some(intent),
            candidates,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether a repository path is `skills/<name>/SKILL.md` or `.claude/skills/<name>/SKILL.md`.
pub fn is_canonical_path(path: &str) -> bool {
    CANONICAL_PATH_RE.is_match(path)
}

/// Build the intent record for a repository tree.
pub fn classify(
    paths: &[&str],
    canonical_files: u32,
    repository: &str,
    description: Option<&str>,
) -> RepoIntent {
    let total_files = paths.len() as u32;
    let skill_md_files = paths
        .iter()
        .filter(|p| {
            p.rsplit('/')
                .next()
                .is_some_and(|name| name.eq_ignore_ascii_case("skill.md"))
        })
        .count() as u32;
    let noise_markers = count_noise_markers(paths);
    let keyword_hits = count_keyword_hits(repository, description);
    let score = intent_score(canonical_files, total_files, keyword_hits, noise_markers);

    RepoIntent {
        score,
        tier: tier_for(canonical_files, score),
        skill_md_files,
        canonical_files,
        noise_markers,
        keyword_hits,
        total_files,
    }
}

/// Distinct generic-project markers present in the tree.
pub fn count_noise_markers(paths: &[&str]) -> u32 {
    let mut seen = BTreeSet::new();
    for path in paths {
        let lower = path.to_ascii_lowercase();
        if let Some(name) = lower.rsplit('/').next() {
            if let Some(marker) = NOISE_FILES.iter().find(|m| **m == name) {
                seen.insert(*marker);
            }
        }
        if let Some((top, _)) = lower.split_once('/') {
            if let Some(marker) = NOISE_DIRS.iter().find(|m| **m == top) {
                seen.insert(*marker);
            }
        }
    }
    seen.len() as u32
}

/// Distinct skill keywords in the repository name and description.
pub fn count_keyword_hits(repository: &str, description: Option<&str>) -> u32 {
    let text = format!("{repository} {}", description.unwrap_or_default()).to_lowercase();
    let words: BTreeSet<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    SKILL_KEYWORDS.iter().filter(|k| words.contains(*k)).count() as u32
}

/// Integer intent score in `[0, 100]`.
pub fn intent_score(canonical: u32, total: u32, keyword_hits: u32, noise: u32) -> u8 {
    let canonical = i64::from(canonical);
    let total = i64::from(total);
    let mut score: i64 = 0;

    if canonical > 0 {
        let density = (100.0 * canonical as f64 / total.max(1) as f64).round() as i64;
        score += 10 + (6 * canonical).min(36) + density.min(30);
    }
    score += (5 * i64::from(keyword_hits)).min(15);
    score -= (4 * i64::from(noise)).min(24);
    if total > 1500 && canonical < 3 {
        score -= 15;
    }

    score.clamp(0, 100) as u8
}

/// Tier for a score; `NotSkills` exactly when there are no canonical files.
pub fn tier_for(canonical: u32, score: u8) -> IntentTier {
    if canonical == 0 {
        IntentTier::NotSkills
    } else if score >= 70 {
        IntentTier::SkillsOnly
    } else if score >= 45 {
        IntentTier::SkillsFocused
    } else {
        IntentTier::Mixed
    }
}

/// Convert a glob-like pattern to a regex.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::test_support::mock_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn canonical_paths() {
        assert!(is_canonical_path("skills/pdf/SKILL.md"));
        assert!(is_canonical_path(".claude/skills/pdf/SKILL.md"));
        assert!(is_canonical_path("skills/pdf/skill.md"));
        assert!(!is_canonical_path("skills/SKILL.md"));
        assert!(!is_canonical_path("skills/a/b/SKILL.md"));
        assert!(!is_canonical_path("docs/skills/pdf/SKILL.md"));
        assert!(!is_canonical_path("SKILL.md"));
    }

    #[test]
    fn score_is_monotonic_in_canonical_count() {
        for total in [10u32, 200, 2000] {
            for kw in 0..4 {
                for noise in 0..8 {
                    let mut prev = 0u8;
                    for c in 0..=total.min(40) {
                        let s = intent_score(c, total, kw, noise);
                        assert!(s >= prev, "c={c} total={total} kw={kw} noise={noise}");
                        prev = s;
                    }
                }
            }
        }
    }

    #[test]
    fn tier_is_not_skills_iff_no_canonical_files() {
        assert_eq!(tier_for(0, 100), IntentTier::NotSkills);
        assert_eq!(tier_for(1, 0), IntentTier::Mixed);
        assert_eq!(tier_for(1, 45), IntentTier::SkillsFocused);
        assert_eq!(tier_for(1, 70), IntentTier::SkillsOnly);
    }

    #[test]
    fn score_examples() {
        // 5 canonical of 12 files, "claude-skills" keywords, no noise:
        // 10 + 30 + min(42, 30) + 10 = 80
        assert_eq!(intent_score(5, 12, 2, 0), 80);
        // Large mixed repo with a single skill.
        assert_eq!(intent_score(1, 2000, 0, 6), 0);
        // Keywords alone never lift a repo without canonical files.
        assert_eq!(tier_for(0, intent_score(0, 10, 3, 0)), IntentTier::NotSkills);
    }

    #[test]
    fn noise_markers_are_distinct() {
        let paths = [
            "package.json",
            "web/package.json",
            "src/main.rs",
            "src/lib.rs",
            "Cargo.toml",
            "docs/src/readme.md",
        ];
        // package.json, src, cargo.toml
        assert_eq!(count_noise_markers(&paths), 3);
    }

    #[test]
    fn keyword_hits_use_whole_words() {
        assert_eq!(count_keyword_hits("acme/claude-skills", None), 2);
        assert_eq!(
            count_keyword_hits("acme/tools", Some("An MCP agent toolkit")),
            2
        );
        assert_eq!(count_keyword_hits("acme/skillful", None), 0);
    }

    #[test]
    fn glob_patterns() {
        let re = glob_to_regex("skills/**").unwrap();
        assert!(re.is_match("skills/pdf/SKILL.md"));
        let re = glob_to_regex("skills/*/SKILL.md").unwrap();
        assert!(re.is_match("skills/pdf/SKILL.md"));
        assert!(!re.is_match(".claude/skills/pdf/SKILL.md"));
    }

    async fn mount_repo(server: &MockServer, repo: &str, description: &str, paths: &[&str]) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": repo,
                "default_branch": "main",
                "description": description,
                "pushed_at": "2026-09-01T00:00:00Z"
            })))
            .mount(server)
            .await;
        let tree: Vec<_> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| serde_json::json!({"path": p, "type": "blob", "sha": format!("sha{i}")}))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}/git/trees/main")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"tree": tree})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn skills_repo_yields_candidates() {
        let server = MockServer::start().await;
        mount_repo(
            &server,
            "acme/claude-skills",
            "Agent skills",
            &[
                "README.md",
                "skills/pdf/SKILL.md",
                "skills/xlsx/SKILL.md",
                ".claude/skills/review/SKILL.md",
                "docs/SKILL.md",
            ],
        )
        .await;

        let scanner = RepoScanner::new(mock_client(&server.uri(), None));
        let outcome = scanner
            .scan("acme/claude-skills", &ScanRules::default())
            .await;

        let intent = outcome.intent.unwrap();
        assert_eq!(intent.canonical_files, 3);
        assert_eq!(intent.skill_md_files, 4);
        assert_eq!(intent.tier, IntentTier::SkillsOnly);
        assert_eq!(outcome.candidates.len(), 3);

        let first = &outcome.candidates[0];
        assert_eq!(first.branch, "main");
        assert_eq!(
            first.page_url,
            "https://github.com/acme/claude-skills/blob/main/skills/pdf/SKILL.md"
        );
        assert!(first.raw_url.ends_with("/acme/claude-skills/main/skills/pdf/SKILL.md"));
        assert_eq!(first.sha, "sha1");
        assert!(first.pushed_at.is_some());
    }

    #[tokio::test]
    async fn generic_repo_is_not_skills() {
        let server = MockServer::start().await;
        let files: Vec<String> = (0..50).map(|i| format!("src/module_{i}.rs")).collect();
        let paths: Vec<&str> = files.iter().map(String::as_str).collect();
        mount_repo(&server, "acme/server", "A web server", &paths).await;

        let scanner = RepoScanner::new(mock_client(&server.uri(), None));
        let outcome = scanner
            .scan(
                "acme/server",
                &ScanRules {
                    min_tier: IntentTier::Mixed,
                    allowed_path_globs: Vec::new(),
                },
            )
            .await;

        assert_eq!(outcome.intent.unwrap().tier, IntentTier::NotSkills);
        assert!(outcome.candidates.is_empty());
    }

    #[tokio::test]
    async fn path_globs_filter_canonical_files() {
        let server = MockServer::start().await;
        mount_repo(
            &server,
            "acme/skills",
            "skills",
            &["skills/a/SKILL.md", ".claude/skills/b/SKILL.md"],
        )
        .await;

        let scanner = RepoScanner::new(mock_client(&server.uri(), None));
        let outcome = scanner
            .scan(
                "acme/skills",
                &ScanRules {
                    min_tier: IntentTier::Mixed,
                    allowed_path_globs: vec!["skills/**".into()],
                },
            )
            .await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].path, "skills/a/SKILL.md");
    }

    #[tokio::test]
    async fn missing_repo_yields_empty_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scanner = RepoScanner::new(mock_client(&server.uri(), None));
        let outcome = scanner.scan("ghost/repo", &ScanRules::default()).await;
        assert_eq!(outcome, ScanOutcome::default());
    }
}
