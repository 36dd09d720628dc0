//! Cycle orchestration: policy → ingest → drain → backfills → heartbeat.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use skillcatalog_crawler::{Fetcher, GithubClient, RepoScanner};
use skillcatalog_discovery::{SourceDefinition, resolve_sources};
use skillcatalog_shared::{
    AppConfig, EventLevel, PolicyPatch, RUNTIME_POLICY_KEY, Result, RuntimePolicy, WorkerPhase,
};
use skillcatalog_storage::Storage;

use crate::backfill::{BackfillReport, Backfiller};
use crate::heartbeat::Heartbeat;
use crate::ingest::{IngestReport, ingest};
use crate::security::ModelClient;
use crate::worker::{BatchReport, Worker};

/// Progress callback for reporting cycle status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when ingest moves to the next source.
    fn source_started(&self, source_id: &str, current: usize, total: usize);
    /// Called after each pending document reaches a terminal status.
    fn document_processed(&self, current: usize, total: usize);
    /// Called when the cycle completes.
    fn done(&self, report: &CycleReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_started(&self, _source_id: &str, _current: usize, _total: usize) {}
    fn document_processed(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &CycleReport) {}
}

// ---------------------------------------------------------------------------
// Runtime policy
// ---------------------------------------------------------------------------

/// The stored runtime policy, or `fallback` when none is stored or it is unreadable.
pub async fn load_policy(storage: &Storage, fallback: &RuntimePolicy) -> RuntimePolicy {
    match storage.get_setting::<RuntimePolicy>(RUNTIME_POLICY_KEY).await {
        Ok(Some(policy)) => policy.normalized(),
        Ok(None) => fallback.clone().normalized(),
        Err(e) => {
            warn!(error = %e, "stored runtime policy unreadable, using config defaults");
            fallback.clone().normalized()
        }
    }
}

/// Apply `patch` on top of the effective policy and store the result.
pub async fn update_policy(
    storage: &Storage,
    fallback: &RuntimePolicy,
    patch: &PolicyPatch,
) -> Result<RuntimePolicy> {
    let updated = load_policy(storage, fallback).await.apply(patch)?;
    storage.put_setting(RUNTIME_POLICY_KEY, &updated).await?;
    info!(?updated, "runtime policy updated");
    Ok(updated)
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// Whether a cycle runs the ingest stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Skip,
    /// Ingest when the runtime policy enables auto-ingest.
    Auto,
    Force,
}

/// Stages a single cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStages {
    pub ingest: IngestMode,
    pub process: bool,
    pub backfill: bool,
}

impl CycleStages {
    pub const FULL: Self = Self {
        ingest: IngestMode::Auto,
        process: true,
        backfill: true,
    };

    pub const INGEST: Self = Self {
        ingest: IngestMode::Force,
        process: false,
        backfill: false,
    };

    pub const PROCESS: Self = Self {
        ingest: IngestMode::Skip,
        process: true,
        backfill: false,
    };

    pub const BACKFILL: Self = Self {
        ingest: IngestMode::Skip,
        process: false,
        backfill: true,
    };

    fn ingests(&self, policy: &RuntimePolicy) -> bool {
        match self.ingest {
            IngestMode::Skip => false,
            IngestMode::Auto => policy.auto_ingest_enabled,
            IngestMode::Force => true,
        }
    }
}

/// Result of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub policy: RuntimePolicy,
    pub ingest: Option<IngestReport>,
    pub processing: Option<BatchReport>,
    pub backfill: Option<BackfillReport>,
    pub pending_before: u64,
    pub pending_after: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Storage plus the network clients a cycle needs.
pub struct Pipeline {
    storage: Storage,
    config: AppConfig,
    scanner: RepoScanner,
    model: Option<ModelClient>,
    sources: Vec<SourceDefinition>,
}

impl Pipeline {
    /// Build clients from `config`. Secrets come from the environment.
    pub fn new(storage: Storage, config: AppConfig) -> Result<Self> {
        let fetcher = Fetcher::new(Duration::from_secs(config.github.timeout_secs))?;
        let github = GithubClient::new(fetcher, &config.github, config.github_token());
        let model = ModelClient::from_config(&config.classifier, config.classifier_api_key())?;
        if model.is_none() {
            info!("no classifier endpoint configured, heuristic scanning only");
        }
        Ok(Self::with_parts(storage, config, RepoScanner::new(github), model))
    }

    /// Assemble from prebuilt clients.
    pub fn with_parts(
        storage: Storage,
        config: AppConfig,
        scanner: RepoScanner,
        model: Option<ModelClient>,
    ) -> Self {
        let sources = resolve_sources(&config.sources);
        Self {
            storage,
            config,
            scanner,
            model,
            sources,
        }
    }

    /// Replace the resolved source list.
    pub fn with_sources(mut self, sources: Vec<SourceDefinition>) -> Self {
        self.sources = sources;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sources(&self) -> &[SourceDefinition] {
        &self.sources
    }

    pub async fn load_policy(&self) -> RuntimePolicy {
        load_policy(&self.storage, &self.config.policy).await
    }

    /// Run one cycle. The heartbeat is written after each phase and the
    /// status ends `Idle` even when a stage fails.
    #[instrument(skip_all, fields(ingest = ?stages.ingest, process = stages.process, backfill = stages.backfill))]
    pub async fn run_cycle(
        &self,
        stages: CycleStages,
        progress: &dyn ProgressReporter,
    ) -> Result<CycleReport> {
        let started_at = Utc::now();
        let policy = self.load_policy().await;
        let mut heartbeat = Heartbeat::load(&self.storage).await;
        {
            let status = heartbeat.status_mut();
            status.loop_started_at = Some(started_at);
            status.auto_ingest_enabled = policy.auto_ingest_enabled;
            status.interval_secs = policy.interval_secs;
            status.last_error = None;
        }

        let result = self
            .stages(&policy, stages, &mut heartbeat, progress, started_at)
            .await;

        let finished_at = Utc::now();
        {
            let status = heartbeat.status_mut();
            status.loop_finished_at = Some(finished_at);
            status.next_run_at = Some(finished_at + chrono::Duration::seconds(policy.interval_secs as i64));
        }
        match &result {
            Ok(report) => {
                let status = heartbeat.status_mut();
                status.last_pending_before = report.pending_before;
                status.last_pending_after = report.pending_after;
                if let Some(ingest) = &report.ingest {
                    status.last_ingested_documents = ingest.new_or_changed();
                }
                if let Some(processing) = &report.processing {
                    status.last_processed_in_loop = processing.settled();
                    status.last_error_count_in_loop = processing.failed;
                }
                if let Some(backfill) = &report.backfill {
                    status.last_backfilled = backfill.total();
                }
            }
            Err(e) => {
                heartbeat.status_mut().last_error = Some(e.to_string());
                heartbeat.event(EventLevel::Error, format!("cycle failed: {e}"));
            }
        }
        heartbeat.enter(WorkerPhase::Idle).await;

        if let Ok(report) = &result {
            progress.done(report);
        }
        result
    }

    async fn stages(
        &self,
        policy: &RuntimePolicy,
        stages: CycleStages,
        heartbeat: &mut Heartbeat<'_>,
        progress: &dyn ProgressReporter,
        started_at: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let pending_before = self.storage.raw_status_counts().await?.pending;

        let ingest_report = if stages.ingests(policy) {
            progress.phase("Ingesting sources");
            heartbeat.enter(WorkerPhase::Ingesting).await;
            let report = ingest(
                &self.storage,
                &self.scanner,
                &self.sources,
                heartbeat,
                progress,
            )
            .await;
            heartbeat.event(
                EventLevel::Info,
                format!(
                    "ingest: {} repositories, {} new or changed documents",
                    report.repositories_scanned,
                    report.new_or_changed()
                ),
            );
            Some(report)
        } else {
            None
        };

        let processing = if stages.process {
            progress.phase("Processing documents");
            heartbeat.enter(WorkerPhase::Processing).await;
            let worker = Worker::new(&self.storage, self.model.as_ref(), policy.clone());
            let report = worker
                .drain(
                    self.config.worker.batch_size,
                    self.config.worker.max_batches,
                    progress,
                )
                .await?;
            heartbeat.event(
                EventLevel::Info,
                format!(
                    "processed {}: {} published, {} skipped, {} errors",
                    report.settled(),
                    report.published,
                    report.skipped,
                    report.failed
                ),
            );
            Some(report)
        } else {
            None
        };

        let backfill = if stages.backfill {
            progress.phase("Backfilling entries");
            heartbeat.enter(WorkerPhase::Backfilling).await;
            let backfiller = Backfiller::new(
                &self.storage,
                self.model.as_ref(),
                self.config.worker.backfill_batch_size,
            );
            Some(backfiller.run().await)
        } else {
            None
        };

        let pending_after = self.storage.raw_status_counts().await?.pending;
        Ok(CycleReport {
            policy: policy.clone(),
            ingest: ingest_report,
            processing,
            backfill,
            pending_before,
            pending_after,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run full cycles until Ctrl-C, sleeping the policy interval between them.
    pub async fn run_loop(&self, progress: &dyn ProgressReporter) -> Result<()> {
        loop {
            let interval = match self.run_cycle(CycleStages::FULL, progress).await {
                Ok(report) => report.policy.interval_secs,
                Err(e) => {
                    warn!(error = %e, "cycle failed, retrying after interval");
                    self.load_policy().await.interval_secs
                }
            };

            {
                let mut heartbeat = Heartbeat::load(&self.storage).await;
                heartbeat.enter(WorkerPhase::Sleeping).await;
            }
            info!(interval_secs = interval, "sleeping until next cycle");

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, stopping");
                    break;
                }
            }
        }

        let mut heartbeat = Heartbeat::load(&self.storage).await;
        heartbeat.event(EventLevel::Info, "worker stopped");
        heartbeat.enter(WorkerPhase::Stopped).await;
        Ok(())
    }
}
