//! Core pipeline orchestration and domain logic for the skill catalog.
//!
//! This crate ties together discovery, repository scanning, validation,
//! security scanning, and catalog upserts into the worker cycle
//! (ingest → process → backfill) driven by [`pipeline::Pipeline`].

pub mod backfill;
pub mod canonical;
pub mod heartbeat;
pub mod ingest;
pub mod pipeline;
pub mod security;
pub mod taxonomy;
pub mod trust;
pub mod upsert;
pub mod validate;
pub mod worker;

pub use backfill::{BackfillReport, Backfiller};
pub use heartbeat::{Heartbeat, read_status};
pub use ingest::{IngestReport, ingest};
pub use pipeline::{
    CycleReport, CycleStages, IngestMode, Pipeline, ProgressReporter, SilentProgress,
    load_policy, update_policy,
};
pub use security::{ModelClient, ScanInput, SecurityScanner};
pub use trust::{TrustInputs, TrustProfile, compute_trust};
pub use upsert::{CatalogWriter, EntryDraft, UpsertOutcome};
pub use worker::{BatchReport, DocumentOutcome, Worker};

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use skillcatalog_crawler::{Fetcher, GithubClient, RepoScanner};
    use skillcatalog_discovery::SourceDefinition;
    use skillcatalog_shared::{
        CatalogEntry, CrawlProvenance, DocumentMetadata, GithubConfig, IntentTier, RepoIntent,
        Source, SourceKind,
    };
    use skillcatalog_storage::{NewRawDocument, Storage};

    use crate::canonical::entry_slug;

    pub(crate) const TEST_REPO: &str = "acme/skills";

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Test storage with one extra SQL statement applied through a second
    /// connection, e.g. a trigger that makes certain writes fail.
    pub(crate) async fn test_storage_with(sql: &str) -> Storage {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        let db = libsql::Builder::new_local(&tmp)
            .build()
            .await
            .expect("open second handle");
        db.connect()
            .expect("connect")
            .execute(sql, ())
            .await
            .expect("apply test sql");
        storage
    }

    pub(crate) async fn seed_source(storage: &Storage, id: &str) {
        storage
            .ensure_source(&Source {
                id: id.into(),
                name: id.into(),
                url: format!("https://github.com/{id}"),
                kind: SourceKind::Repository,
                is_active: true,
            })
            .await
            .expect("seed source");
    }

    pub(crate) fn repo_source(repo: &str) -> SourceDefinition {
        SourceDefinition::repository(repo, repo, repo)
    }

    /// Scanner pointed at a mock server; raw files live under `/raw`.
    pub(crate) fn mock_scanner(base: &str) -> RepoScanner {
        let config = GithubConfig {
            api_base: base.to_string(),
            raw_base: format!("{base}/raw"),
            web_base: "https://github.com".into(),
            ..GithubConfig::default()
        };
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        RepoScanner::new(GithubClient::new(fetcher, &config, None))
    }

    /// Serve repo info, a tree with `files` plus `extra_paths`, and raw file bodies.
    pub(crate) async fn mount_repo(
        server: &MockServer,
        repo: &str,
        files: &[(&str, &str)],
        extra_paths: &[&str],
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": repo,
                "default_branch": "main",
                "description": "Claude skills collection",
                "pushed_at": Utc::now().to_rfc3339()
            })))
            .mount(server)
            .await;

        let tree: Vec<_> = files
            .iter()
            .map(|(p, _)| *p)
            .chain(extra_paths.iter().copied())
            .enumerate()
            .map(|(i, p)| serde_json::json!({"path": p, "type": "blob", "sha": format!("sha{i}")}))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}/git/trees/main")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"tree": tree, "truncated": false})),
            )
            .mount(server)
            .await;

        for (file, body) in files {
            Mock::given(method("GET"))
                .and(path(format!("/raw/{repo}/main/{file}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(*body))
                .mount(server)
                .await;
        }
    }

    pub(crate) fn skills_focused_intent() -> RepoIntent {
        RepoIntent {
            score: 60,
            tier: IntentTier::SkillsFocused,
            skill_md_files: 3,
            canonical_files: 3,
            noise_markers: 0,
            keyword_hits: 2,
            total_files: 10,
        }
    }

    /// Store a pending raw document for `path` inside [`TEST_REPO`]. Returns its id.
    pub(crate) async fn seed_raw(
        storage: &Storage,
        path: &str,
        content: &str,
        intent: Option<RepoIntent>,
    ) -> String {
        seed_source(storage, TEST_REPO).await;
        let raw_url = format!("https://raw.githubusercontent.com/{TEST_REPO}/main/{path}");
        let provenance = CrawlProvenance {
            source_id: TEST_REPO.into(),
            repository: TEST_REPO.into(),
            branch: "main".into(),
            path: path.into(),
            sha: None,
            page_url: format!("https://github.com/{TEST_REPO}/blob/main/{path}"),
            intent,
            pushed_at: Some(Utc::now()),
            fetched_at: Utc::now(),
        };
        storage
            .upsert_raw_document(&NewRawDocument {
                source_id: TEST_REPO.into(),
                external_id: raw_url.clone(),
                source_url: raw_url,
                content: content.into(),
                metadata: DocumentMetadata::from_crawl(provenance),
            })
            .await
            .expect("seed raw document")
            .id
    }

    /// Entry with no derived fields filled in.
    pub(crate) fn bare_entry(name: &str, description: &str, url: &str) -> CatalogEntry {
        let now = Utc::now();
        CatalogEntry {
            id: Uuid::now_v7().to_string(),
            slug: entry_slug(name, url),
            name: name.into(),
            description: description.into(),
            content: "Body".into(),
            summary: None,
            url: url.into(),
            category_id: None,
            spec: None,
            quality_score: None,
            trust_score: None,
            trust_level: None,
            trust_flags: Vec::new(),
            is_official: false,
            is_verified: false,
            upstream_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
