//! Built-in crawl sources and per-source policy.

use std::collections::HashSet;

use tracing::warn;

use skillcatalog_shared::{IntentTier, SearchMode, Source, SourceConfig, SourceKind};

/// Fetch budgets and acceptance limits for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    /// Globs a canonical path must match; empty allows all.
    pub allowed_path_globs: Vec<String>,
    pub min_tier: IntentTier,
    /// Most repositories a directory or search source may hand to the scanner.
    pub max_repos: usize,
    /// Search result pages per query when authenticated.
    pub max_pages: u32,
    /// Directory pages listed in the sitemap that may be fetched.
    pub max_sitemap_pages: usize,
    /// Skip the source entirely when no API token is configured.
    pub require_token: bool,
}

impl SourcePolicy {
    /// Defaults for a source kind.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Repository => Self {
                allowed_path_globs: Vec::new(),
                min_tier: IntentTier::SkillsFocused,
                max_repos: 1,
                max_pages: 0,
                max_sitemap_pages: 0,
                require_token: false,
            },
            SourceKind::WebDirectory => Self {
                allowed_path_globs: Vec::new(),
                min_tier: IntentTier::SkillsOnly,
                max_repos: 200,
                max_pages: 0,
                max_sitemap_pages: 25,
                require_token: false,
            },
            SourceKind::KeywordSearch => Self {
                allowed_path_globs: Vec::new(),
                min_tier: IntentTier::SkillsOnly,
                max_repos: 100,
                max_pages: 3,
                max_sitemap_pages: 0,
                require_token: true,
            },
        }
    }
}

/// Where a source gets its repositories from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// A single `owner/repo`.
    Repository(String),
    /// Root URL of a web directory.
    WebDirectory(String),
    KeywordSearch {
        queries: Vec<String>,
        mode: SearchMode,
    },
}

impl SourceTarget {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Repository(_) => SourceKind::Repository,
            Self::WebDirectory(_) => SourceKind::WebDirectory,
            Self::KeywordSearch { .. } => SourceKind::KeywordSearch,
        }
    }
}

/// A crawl origin with its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefinition {
    pub id: String,
    pub name: String,
    pub target: SourceTarget,
    pub is_active: bool,
    pub policy: SourcePolicy,
}

impl SourceDefinition {
    /// Single-repository source with default policy.
    pub fn repository(id: &str, name: &str, repository: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            target: SourceTarget::Repository(repository.into()),
            is_active: true,
            policy: SourcePolicy::for_kind(SourceKind::Repository),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.target.kind()
    }

    /// Origin URL shown for the source.
    pub fn url(&self) -> String {
        match &self.target {
            SourceTarget::Repository(repo) => format!("https://github.com/{repo}"),
            SourceTarget::WebDirectory(url) => url.clone(),
            SourceTarget::KeywordSearch { queries, mode } => {
                let kind = match mode {
                    SearchMode::Code => "code",
                    SearchMode::Repositories => "repositories",
                };
                match queries.first() {
                    Some(q) => {
                        let query = url::form_urlencoded::Serializer::new(String::new())
                            .append_pair("q", q)
                            .append_pair("type", kind)
                            .finish();
                        format!("https://github.com/search?{query}")
                    }
                    None => "https://github.com/search".into(),
                }
            }
        }
    }

    /// Storage record for this source.
    pub fn to_source(&self) -> Source {
        Source {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url(),
            kind: self.kind(),
            is_active: self.is_active,
        }
    }

    /// Build from a `[[sources]]` config entry. Returns `None` when the entry
    /// lacks the field its kind needs.
    pub fn from_config(cfg: &SourceConfig) -> Option<Self> {
        let target = match cfg.kind {
            SourceKind::Repository => {
                let repo = cfg.repository.as_deref().map(str::trim).filter(|r| is_repo_ref(r))?;
                SourceTarget::Repository(repo.to_string())
            }
            SourceKind::WebDirectory => {
                let url = cfg.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
                url::Url::parse(url).ok()?;
                SourceTarget::WebDirectory(url.to_string())
            }
            SourceKind::KeywordSearch => {
                let queries: Vec<String> = cfg
                    .queries
                    .iter()
                    .map(|q| q.trim())
                    .filter(|q| !q.is_empty())
                    .map(String::from)
                    .collect();
                if queries.is_empty() {
                    return None;
                }
                SourceTarget::KeywordSearch {
                    queries,
                    mode: cfg.search_mode,
                }
            }
        };

        let defaults = SourcePolicy::for_kind(cfg.kind);
        let policy = SourcePolicy {
            allowed_path_globs: cfg.allowed_path_globs.clone().unwrap_or_default(),
            min_tier: cfg.min_tier.unwrap_or(defaults.min_tier),
            max_repos: cfg.max_repos.unwrap_or(defaults.max_repos),
            max_pages: cfg.max_pages.unwrap_or(defaults.max_pages),
            max_sitemap_pages: cfg.max_sitemap_pages.unwrap_or(defaults.max_sitemap_pages),
            require_token: cfg.require_token.unwrap_or(defaults.require_token),
        };

        Some(Self {
            id: cfg.id.trim().to_string(),
            name: cfg.name.clone().unwrap_or_else(|| cfg.id.clone()),
            target,
            is_active: cfg.is_active,
            policy,
        })
    }
}

fn is_repo_ref(s: &str) -> bool {
    let mut parts = s.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(o), Some(r), None) if !o.is_empty() && !r.is_empty()
    )
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Curated repositories, one web directory and two search sources.
pub fn builtin_sources() -> Vec<SourceDefinition> {
    let mut sources = vec![
        SourceDefinition::repository(
            "anthropic-official-skills",
            "Anthropic skills",
            "anthropics/skills",
        ),
        SourceDefinition::repository(
            "claude-code-skills-marketplace-daymade",
            "daymade/claude-code-skills",
            "daymade/claude-code-skills",
        ),
        SourceDefinition::repository(
            "claude-skills-rknall",
            "rknall/claude-skills",
            "rknall/claude-skills",
        ),
        SourceDefinition::repository(
            "claude-skills-marketplace-mhattingpete",
            "mhattingpete/claude-skills-marketplace",
            "mhattingpete/claude-skills-marketplace",
        ),
        SourceDefinition::repository(
            "claude-code-marketplace-getty104",
            "getty104/claude-code-marketplace",
            "getty104/claude-code-marketplace",
        ),
        SourceDefinition::repository(
            "claude-skills-jamie-bitflight",
            "Jamie-BitFlight/claude_skills",
            "Jamie-BitFlight/claude_skills",
        ),
        SourceDefinition::repository(
            "cc-dev-tools-lucklyric",
            "Lucklyric/cc-dev-tools",
            "Lucklyric/cc-dev-tools",
        ),
        SourceDefinition::repository("hf-skills", "Hugging Face skills", "huggingface/skills"),
    ];

    sources.push(SourceDefinition {
        id: "skillsmp-directory".into(),
        name: "SkillsMP directory".into(),
        target: SourceTarget::WebDirectory("https://skillsmp.com".into()),
        is_active: true,
        policy: SourcePolicy::for_kind(SourceKind::WebDirectory),
    });

    sources.push(SourceDefinition {
        id: "github-code-search-skill-md".into(),
        name: "GitHub code search: SKILL.md".into(),
        target: SourceTarget::KeywordSearch {
            queries: vec![
                "filename:SKILL.md path:skills".into(),
                "filename:SKILL.md path:.claude/skills".into(),
            ],
            mode: SearchMode::Code,
        },
        is_active: true,
        policy: SourcePolicy::for_kind(SourceKind::KeywordSearch),
    });

    sources.push(SourceDefinition {
        id: "github-repo-search-claude-skills".into(),
        name: "GitHub repository search: Claude skills".into(),
        target: SourceTarget::KeywordSearch {
            queries: vec![
                "claude skills in:name,description".into(),
                "topic:claude-skills".into(),
            ],
            mode: SearchMode::Repositories,
        },
        is_active: true,
        policy: SourcePolicy {
            max_pages: 2,
            require_token: false,
            ..SourcePolicy::for_kind(SourceKind::KeywordSearch)
        },
    });

    sources
}

/// Built-in sources followed by config extras.
///
/// Duplicate ids are dropped (first wins), as are repository sources
/// pointing at an already listed repository.
pub fn resolve_sources(extra: &[SourceConfig]) -> Vec<SourceDefinition> {
    let mut seen_ids = HashSet::new();
    let mut seen_repos = HashSet::new();
    let mut out = Vec::new();

    let extras = extra.iter().filter_map(|cfg| {
        let def = SourceDefinition::from_config(cfg);
        if def.is_none() {
            warn!(id = %cfg.id, kind = %cfg.kind, "ignoring incomplete source config");
        }
        def
    });

    for def in builtin_sources().into_iter().chain(extras) {
        if def.id.is_empty() || !seen_ids.insert(def.id.clone()) {
            continue;
        }
        if let SourceTarget::Repository(repo) = &def.target {
            if !seen_repos.insert(repo.to_ascii_lowercase()) {
                continue;
            }
        }
        out.push(def);
    }
    out
}
