//! Persisted worker heartbeat.
//!
//! The [`WorkerStatus`] snapshot lives in the settings table under
//! [`WORKER_STATUS_KEY`]. Write failures are logged and otherwise ignored:
//! a missed heartbeat must not stop the pipeline.

use chrono::Utc;
use tracing::{error, info, warn};

use skillcatalog_shared::{EventLevel, Result, WORKER_STATUS_KEY, WorkerPhase, WorkerStatus};
use skillcatalog_storage::Storage;

/// Read the last persisted status.
pub async fn read_status(storage: &Storage) -> Result<Option<WorkerStatus>> {
    storage.get_setting(WORKER_STATUS_KEY).await
}

/// In-memory status plus the store it is flushed to.
pub struct Heartbeat<'a> {
    storage: &'a Storage,
    status: WorkerStatus,
}

impl<'a> Heartbeat<'a> {
    /// Resume from the stored status; unreadable status starts fresh.
    pub async fn load(storage: &'a Storage) -> Self {
        let status = match read_status(storage).await {
            Ok(status) => status.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "stored worker status unreadable, starting fresh");
                WorkerStatus::default()
            }
        };
        Self { storage, status }
    }

    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut WorkerStatus {
        &mut self.status
    }

    /// Switch phase and flush.
    pub async fn enter(&mut self, phase: WorkerPhase) {
        self.status.enter(phase);
        self.flush().await;
    }

    /// Append to the bounded event log (not flushed).
    pub fn event(&mut self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            EventLevel::Info => info!(event = %message, "worker event"),
            EventLevel::Warn => warn!(event = %message, "worker event"),
            EventLevel::Error => error!(event = %message, "worker event"),
        }
        self.status.push_event(level, message);
    }

    /// Refresh the heartbeat timestamp and persist.
    pub async fn flush(&mut self) {
        self.status.heartbeat_at = Some(Utc::now());
        if let Err(e) = self.storage.put_setting(WORKER_STATUS_KEY, &self.status).await {
            warn!(error = %e, "failed to persist worker status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;

    #[tokio::test]
    async fn status_round_trips_through_settings() {
        let storage = test_storage().await;
        {
            let mut hb = Heartbeat::load(&storage).await;
            assert_eq!(hb.status().phase, WorkerPhase::Idle);
            hb.event(EventLevel::Warn, "source failed");
            hb.status_mut().last_processed_in_loop = 7;
            hb.enter(WorkerPhase::Processing).await;
        }

        let stored = read_status(&storage).await.unwrap().unwrap();
        assert_eq!(stored.phase, WorkerPhase::Processing);
        assert_eq!(stored.last_processed_in_loop, 7);
        assert_eq!(stored.recent_events.len(), 1);
        assert!(stored.heartbeat_at.is_some());

        let resumed = Heartbeat::load(&storage).await;
        assert_eq!(resumed.status().recent_events.len(), 1);
    }

    #[tokio::test]
    async fn missing_status_reads_as_none() {
        let storage = test_storage().await;
        assert!(read_status(&storage).await.unwrap().is_none());
    }
}
