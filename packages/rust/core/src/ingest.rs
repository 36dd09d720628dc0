//! Ingest stage: sources → repositories → scanned candidates → raw documents.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use skillcatalog_crawler::{RepoScanner, ScanRules, SkillCandidate};
use skillcatalog_discovery::{ScannedRepos, SourceDefinition, discover_repositories};
use skillcatalog_shared::{
    CrawlProvenance, DocumentMetadata, EventLevel, IngestProgress, RawTransition,
};
use skillcatalog_storage::{NewRawDocument, Storage};

use crate::heartbeat::Heartbeat;
use crate::pipeline::ProgressReporter;

/// Counters for one ingest pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub sources_visited: usize,
    pub sources_skipped: usize,
    pub repositories_scanned: usize,
    pub candidates: usize,
    pub created: usize,
    pub content_changed: usize,
    pub unchanged: usize,
    pub fetch_failures: usize,
    pub errors: Vec<String>,
}

impl IngestReport {
    /// Documents that now need processing.
    pub fn new_or_changed(&self) -> usize {
        self.created + self.content_changed
    }
}

/// Walk every active source and store the documents it yields.
///
/// Failures are recorded per source or per document; the pass always
/// continues with the next item.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn ingest(
    storage: &Storage,
    scanner: &RepoScanner,
    sources: &[SourceDefinition],
    heartbeat: &mut Heartbeat<'_>,
    progress: &dyn ProgressReporter,
) -> IngestReport {
    let mut report = IngestReport::default();
    let mut scanned = ScannedRepos::new();
    let total = sources.len();

    for (index, source) in sources.iter().enumerate() {
        progress.source_started(&source.id, index + 1, total);
        heartbeat.status_mut().ingest = IngestProgress {
            source_id: Some(source.id.clone()),
            source_kind: Some(source.kind().to_string()),
            source_index: index + 1,
            source_total: total,
            ..IngestProgress::default()
        };
        heartbeat.flush().await;

        if !source.is_active {
            debug!(source = %source.id, "inactive source skipped");
            report.sources_skipped += 1;
            continue;
        }

        if let Err(e) = storage.ensure_source(&source.to_source()).await {
            record_source_error(&mut report, heartbeat, &source.id, &e.to_string());
            continue;
        }

        let discovered = discover_repositories(scanner.github(), source).await;
        if discovered.skipped {
            report.sources_skipped += 1;
            heartbeat.event(
                EventLevel::Info,
                format!("{}: skipped (no API token)", source.id),
            );
            continue;
        }
        report.sources_visited += 1;
        for err in &discovered.errors {
            record_source_error(&mut report, heartbeat, &source.id, err);
        }

        let rules = ScanRules {
            min_tier: source.policy.min_tier,
            allowed_path_globs: source.policy.allowed_path_globs.clone(),
        };
        let repo_total = discovered.repositories.len();

        for (repo_index, repo) in discovered.repositories.iter().enumerate() {
            if !scanned.first_visit(repo) {
                continue;
            }
            {
                let ingest = &mut heartbeat.status_mut().ingest;
                ingest.repository = Some(repo.clone());
                ingest.repo_index = repo_index + 1;
                ingest.repo_total = repo_total;
            }
            heartbeat.flush().await;

            let outcome = scanner.scan(repo, &rules).await;
            report.repositories_scanned += 1;
            report.candidates += outcome.candidates.len();

            for candidate in &outcome.candidates {
                store_candidate(storage, scanner, &source.id, candidate, &mut report).await;
            }
        }
    }

    info!(
        visited = report.sources_visited,
        repositories = report.repositories_scanned,
        created = report.created,
        changed = report.content_changed,
        unchanged = report.unchanged,
        errors = report.errors.len(),
        "ingest finished"
    );
    report
}

async fn store_candidate(
    storage: &Storage,
    scanner: &RepoScanner,
    source_id: &str,
    candidate: &SkillCandidate,
    report: &mut IngestReport,
) {
    let Some(content) = scanner.github().fetcher().get_text(&candidate.raw_url).await else {
        report.fetch_failures += 1;
        return;
    };

    let doc = NewRawDocument {
        source_id: source_id.to_string(),
        external_id: candidate.raw_url.clone(),
        source_url: candidate.raw_url.clone(),
        content,
        metadata: DocumentMetadata::from_crawl(provenance(source_id, candidate)),
    };

    match storage.upsert_raw_document(&doc).await {
        Ok(upsert) => match upsert.transition {
            RawTransition::Created => report.created += 1,
            RawTransition::ContentChanged => report.content_changed += 1,
            RawTransition::Unchanged => report.unchanged += 1,
        },
        Err(e) => {
            warn!(url = %candidate.raw_url, error = %e, "failed to store raw document");
            report.errors.push(format!("{}: {e}", candidate.raw_url));
        }
    }
}

fn provenance(source_id: &str, candidate: &SkillCandidate) -> CrawlProvenance {
    CrawlProvenance {
        source_id: source_id.to_string(),
        repository: candidate.repository.clone(),
        branch: candidate.branch.clone(),
        path: candidate.path.clone(),
        sha: Some(candidate.sha.clone()).filter(|s| !s.is_empty()),
        page_url: candidate.page_url.clone(),
        intent: Some(candidate.intent.clone()),
        pushed_at: candidate.pushed_at,
        fetched_at: Utc::now(),
    }
}

fn record_source_error(
    report: &mut IngestReport,
    heartbeat: &mut Heartbeat<'_>,
    source_id: &str,
    message: &str,
) {
    let line = format!("{source_id}: {message}");
    heartbeat.status_mut().ingest.last_source_error = Some(line.clone());
    heartbeat.event(EventLevel::Warn, line.clone());
    report.errors.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::test_support::{mock_scanner, mount_repo, repo_source, test_storage};
    use wiremock::MockServer;

    #[tokio::test]
    async fn ingests_canonical_documents_once() {
        let server = MockServer::start().await;
        mount_repo(
            &server,
            "acme/skills",
            &[
                ("skills/foo/SKILL.md", "---\nname: foo\ndescription: Formats code nicely for you.\n---\nBody"),
                ("skills/bar/SKILL.md", "---\nname: bar\n---\nBar body"),
            ],
            &["README.md"],
        )
        .await;

        let storage = test_storage().await;
        let scanner = mock_scanner(&server.uri());
        let mut hb = Heartbeat::load(&storage).await;
        let sources = vec![repo_source("acme/skills"), repo_source("ACME/Skills")];

        let report = ingest(&storage, &scanner, &sources, &mut hb, &SilentProgress).await;
        assert_eq!(report.repositories_scanned, 1);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.created, 2);
        assert!(report.errors.is_empty());

        let pending = storage.list_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        let crawl = pending[0].metadata.crawl.as_ref().unwrap();
        assert_eq!(crawl.repository, "acme/skills");
        assert!(crawl.intent.is_some());
        assert!(crawl.page_url.starts_with("https://github.com/acme/skills/blob/main/skills/"));

        // A second pass sees identical content.
        let mut hb = Heartbeat::load(&storage).await;
        let again = ingest(&storage, &scanner, &sources[..1], &mut hb, &SilentProgress).await;
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.new_or_changed(), 0);
        assert_eq!(hb.status().ingest.source_total, 1);
    }

    #[tokio::test]
    async fn inactive_sources_are_skipped() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        let scanner = mock_scanner(&server.uri());
        let mut hb = Heartbeat::load(&storage).await;
        let mut source = repo_source("acme/skills");
        source.is_active = false;

        let report = ingest(&storage, &scanner, &[source], &mut hb, &SilentProgress).await;
        assert_eq!(report.sources_skipped, 1);
        assert_eq!(report.repositories_scanned, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_repo_yields_nothing() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        let scanner = mock_scanner(&server.uri());
        let mut hb = Heartbeat::load(&storage).await;

        let report = ingest(
            &storage,
            &scanner,
            &[repo_source("ghost/repo")],
            &mut hb,
            &SilentProgress,
        )
        .await;
        assert_eq!(report.repositories_scanned, 1);
        assert_eq!(report.candidates, 0);
        let counts = storage.raw_status_counts().await.unwrap();
        assert_eq!(counts.pending, 0);
    }
}
