//! The `Tracker` service: worker registration, heartbeats, and leasing.

use chrono::Utc;
use gantry_core::{AttemptEntry, Error, ResourceId, Result, WorkStatus, WorkerKind, WorkerRecord};
use gantry_rpc::wire::{LeaseGrant, LeasedWork};
use gantry_store::{Op, Store, StoreError, WorkAssert};
use tracing::{debug, info};

use crate::AppState;

#[derive(Clone)]
pub struct TrackerService {
    state: AppState,
}

impl TrackerService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Register a worker (or refresh its registration) and hand back its key.
    pub async fn announce(&self, kind: WorkerKind, url: String) -> Result<ResourceId> {
        let worker = WorkerRecord::new(kind, url, Utc::now());
        let key = worker.id;
        self.state
            .store
            .upsert_worker(worker)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        info!(%key, kind = kind.as_str(), "worker announced");
        Ok(key)
    }

    pub async fn remove(&self, key: ResourceId) -> Result<()> {
        self.state
            .store
            .remove_worker(key)
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }

    /// Record worker liveness. Dashboard data only; never governs lease
    /// expiry.
    pub async fn ping(&self, key: ResourceId) -> Result<()> {
        self.state
            .store
            .ping_worker(key, Utc::now())
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }

    /// Lease the next available item to an available builder+runner pair.
    ///
    /// Returns `None` when there is no item, builder, or runner; callers
    /// poll. A conditional transaction that loses a race to another tracker
    /// silently moves on to the next candidate item.
    pub async fn lease_pair(&self) -> Result<Option<LeaseGrant>> {
        let store = &self.state.store;
        let builders = store
            .workers(WorkerKind::Builder)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        let runners = store
            .workers(WorkerKind::Runner)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        let (Some(builder), Some(runner)) = (builders.first(), runners.first()) else {
            return Ok(None);
        };

        let now = Utc::now();
        let candidates = store
            .leasable_work(now, self.state.attempt_timeout_chrono())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        for item in candidates {
            let attempt = AttemptEntry::new(now);
            let ops = vec![Op::UpdateWork {
                id: item.id,
                assert: WorkAssert {
                    status: item.status,
                    attempt_head: None,
                    rev: item.rev,
                },
                set_status: WorkStatus::Processing,
                push_attempt: Some(attempt.clone()),
            }];

            match store.run(ops).await {
                Ok(()) => {
                    info!(work = %item.id, attempt = %attempt.id, builder = %builder.id, runner = %runner.id, "leased pair");
                    return Ok(Some(LeaseGrant {
                        builder: builder.clone(),
                        runner: runner.clone(),
                        work: LeasedWork {
                            work_id: item.id,
                            attempt_id: attempt.id,
                            work_rev: item.rev + 1,
                            spec: item.spec(),
                        },
                    }));
                }
                Err(StoreError::Aborted) => {
                    debug!(work = %item.id, "lost the lease race, trying next item");
                    continue;
                }
                Err(e) => return Err(Error::Internal(e.to_string())),
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::work::queue_work;
    use gantry_core::{Vcs, WorkSpec};
    use gantry_store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_state() -> AppState {
        AppState::new(
            Arc::new(MemoryStore::new()),
            "http://127.0.0.1:0",
            Duration::from_secs(90),
        )
    }

    fn make_spec(path: &str) -> WorkSpec {
        WorkSpec {
            import_path: path.to_string(),
            revision: "deadbeef".to_string(),
            revision_date: Utc::now(),
            subpackages: false,
            vcs: Vcs::Git,
        }
    }

    async fn announce_pair(tracker: &TrackerService) {
        tracker
            .announce(WorkerKind::Builder, "http://builder:8080".to_string())
            .await
            .unwrap();
        tracker
            .announce(WorkerKind::Runner, "http://runner:8080".to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lease_empty_when_nothing_available() {
        let state = make_state();
        let tracker = TrackerService::new(state.clone());

        // No workers, no items.
        assert!(tracker.lease_pair().await.unwrap().is_none());

        // Workers but no items.
        announce_pair(&tracker).await;
        assert!(tracker.lease_pair().await.unwrap().is_none());

        // Items but no runner.
        let state2 = make_state();
        let tracker2 = TrackerService::new(state2.clone());
        tracker2
            .announce(WorkerKind::Builder, "http://builder:8080".to_string())
            .await
            .unwrap();
        queue_work(&state2, make_spec("github.com/acme/widget"))
            .await
            .unwrap();
        assert!(tracker2.lease_pair().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lease_marks_processing_and_logs_attempt() {
        let state = make_state();
        let tracker = TrackerService::new(state.clone());
        announce_pair(&tracker).await;
        let item = queue_work(&state, make_spec("github.com/acme/widget"))
            .await
            .unwrap();

        let grant = tracker.lease_pair().await.unwrap().unwrap();
        assert_eq!(grant.work.work_id, item.id);
        assert_eq!(grant.work.work_rev, 1);

        let leased = state.store.work_item(item.id).await.unwrap().unwrap();
        assert_eq!(leased.status, WorkStatus::Processing);
        assert_eq!(leased.rev, 1);
        assert_eq!(leased.attempt_head().unwrap().id, grant.work.attempt_id);

        // The item is now held; a second lease finds nothing.
        assert!(tracker.lease_pair().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_attempt_is_released() {
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            "http://127.0.0.1:0",
            Duration::from_secs(0),
        );
        let tracker = TrackerService::new(state.clone());
        announce_pair(&tracker).await;
        queue_work(&state, make_spec("github.com/acme/widget"))
            .await
            .unwrap();

        let first = tracker.lease_pair().await.unwrap().unwrap();
        // With a zero attempt timeout the attempt has already expired, so
        // the item is leasable again under a fresh attempt.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = tracker.lease_pair().await.unwrap().unwrap();

        assert_eq!(first.work.work_id, second.work.work_id);
        assert_ne!(first.work.attempt_id, second.work.attempt_id);
        assert_eq!(second.work.work_rev, 2);

        let item = state
            .store
            .work_item(first.work.work_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.attempt_log.len(), 2);
        assert_eq!(item.attempt_head().unwrap().id, second.work.attempt_id);
        assert_eq!(item.status, WorkStatus::Processing);
    }

    #[tokio::test]
    async fn test_ping_updates_last_seen() {
        let state = make_state();
        let tracker = TrackerService::new(state.clone());
        let key = tracker
            .announce(WorkerKind::Builder, "http://builder:8080".to_string())
            .await
            .unwrap();

        let before = state.store.workers(WorkerKind::Builder).await.unwrap()[0].last_seen;
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.ping(key).await.unwrap();
        let after = state.store.workers(WorkerKind::Builder).await.unwrap()[0].last_seen;
        assert!(after > before);
    }
}
