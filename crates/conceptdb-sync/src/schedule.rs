//! Periodic sync.

use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::manager::SyncManager;
use crate::types::SyncDirection;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl SyncManager {
    fn schedule_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a non-forced sync every `every`, replacing any existing schedule.
    ///
    /// The first cycle runs one interval from now. The task holds only a
    /// weak reference and stops once the manager is dropped. Ticks that
    /// land while a cycle is still running are skipped.
    pub fn schedule(self: &Arc<Self>, every: Duration, direction: SyncDirection) {
        let every = every.max(MIN_INTERVAL);
        let manager = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let report = manager.sync(direction, None, false).await;
                log::debug!(
                    "Scheduled {direction} sync finished: {:?} ({} error(s))",
                    report.status,
                    report.errors.len()
                );
            }
        });

        if let Some(previous) = self.schedule_slot().replace(handle) {
            previous.abort();
        }
        log::info!("Scheduled {direction} sync every {every:?}");
    }

    /// Stop periodic sync. Returns whether a schedule was active.
    pub fn unschedule(&self) -> bool {
        match self.schedule_slot().take() {
            Some(handle) => {
                handle.abort();
                log::info!("Periodic sync stopped");
                true
            }
            None => false,
        }
    }

    /// Whether periodic sync is active.
    pub fn is_scheduled(&self) -> bool {
        self.schedule_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::types::SyncStatus;
    use conceptdb_core::Row;
    use conceptdb_core::adapters::{
        KeywordConceptExtractor, MemoryPreciseStore, MemorySemanticStore, MockEmbeddingProvider,
    };

    async fn manager() -> Arc<SyncManager> {
        let precise = Arc::new(MemoryPreciseStore::new());
        precise
            .upsert_row(
                "notes",
                Row::new().with("id", 1).with("text", "Quarterly revenue revenue review"),
            )
            .await;
        Arc::new(SyncManager::new(
            precise,
            Arc::new(MemorySemanticStore::new()),
            Arc::new(KeywordConceptExtractor::new()),
            Arc::new(MockEmbeddingProvider::new(16)),
            SyncConfig::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sync_runs_on_interval() {
        let manager = manager().await;
        manager.schedule(Duration::from_secs(15 * 60), SyncDirection::Bidirectional);
        assert!(manager.is_scheduled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(manager.status().await.last_sync.is_none());

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        let status = manager.status().await;
        assert!(status.last_sync.is_some());
        assert!(status.scheduled);
        // The second tick finds nothing new and writes no checkpoint.
        assert_eq!(status.checkpoints, 1);

        let report = manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.status, SyncStatus::NoChanges);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedule() {
        let manager = manager().await;
        assert!(!manager.unschedule());

        manager.schedule(Duration::from_secs(60), SyncDirection::PreciseToSemantic);
        manager.schedule(Duration::from_secs(30), SyncDirection::PreciseToSemantic);
        assert!(manager.unschedule());
        assert!(!manager.is_scheduled());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(manager.status().await.last_sync.is_none());
    }
}
