//! Worker heartbeat, persisted under the `worker_status` system setting.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings key holding the serialized [`WorkerStatus`].
pub const WORKER_STATUS_KEY: &str = "worker_status";

/// Maximum number of entries kept in [`WorkerStatus::recent_events`].
pub const MAX_RECENT_EVENTS: usize = 50;

/// Coarse phase of the worker loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    #[default]
    Idle,
    Ingesting,
    Processing,
    Backfilling,
    Sleeping,
    Stopped,
}

impl WorkerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Processing => "processing",
            Self::Backfilling => "backfilling",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
        }
    }
}

/// Severity of a heartbeat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One diagnostic entry in the bounded event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub at: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
}

/// Progress through the ingest stage's source list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestProgress {
    pub source_id: Option<String>,
    pub source_kind: Option<String>,
    /// 1-based index of the current source.
    pub source_index: usize,
    pub source_total: usize,
    pub repository: Option<String>,
    /// 1-based index of the current discovered repository.
    pub repo_index: usize,
    pub repo_total: usize,
    pub last_source_error: Option<String>,
}

/// Snapshot of what the worker is doing and what it did last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(default)]
    pub phase: WorkerPhase,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub loop_started_at: Option<DateTime<Utc>>,
    pub loop_finished_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_ingest_enabled: bool,
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default)]
    pub last_ingested_documents: usize,
    #[serde(default)]
    pub last_pending_before: u64,
    #[serde(default)]
    pub last_pending_after: u64,
    #[serde(default)]
    pub last_processed_in_loop: usize,
    #[serde(default)]
    pub last_error_count_in_loop: usize,
    #[serde(default)]
    pub last_backfilled: usize,
    pub last_error: Option<String>,
    #[serde(default)]
    pub ingest: IngestProgress,
    #[serde(default)]
    pub recent_events: VecDeque<WorkerEvent>,
}

impl WorkerStatus {
    /// Append an event, dropping the oldest beyond [`MAX_RECENT_EVENTS`].
    pub fn push_event(&mut self, level: EventLevel, message: impl Into<String>) {
        self.recent_events.push_back(WorkerEvent {
            at: Utc::now(),
            level,
            message: message.into(),
        });
        while self.recent_events.len() > MAX_RECENT_EVENTS {
            self.recent_events.pop_front();
        }
    }

    /// Move to `phase` and refresh the heartbeat timestamp.
    pub fn enter(&mut self, phase: WorkerPhase) {
        self.phase = phase;
        self.heartbeat_at = Some(Utc::now());
    }
}
