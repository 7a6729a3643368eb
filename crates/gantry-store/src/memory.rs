//! In-memory store implementation.
//!
//! A single mutex over plain maps. Transactions apply against a working
//! copy of the state and swap it in only when every operation succeeds, so
//! the all-or-nothing contract holds trivially.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gantry_core::{
    Notification, ResourceId, TestResult, WorkItem, WorkResult, WorkStatus, WorkerKind,
    WorkerRecord,
};

use crate::{Op, Store, StoreError, StoreResult};

#[derive(Debug, Default, Clone)]
struct Inner {
    work: HashMap<ResourceId, WorkItem>,
    results: HashMap<ResourceId, WorkResult>,
    tests: HashMap<ResourceId, TestResult>,
    notifications: HashMap<ResourceId, Notification>,
    workers: HashMap<ResourceId, WorkerRecord>,
}

impl Inner {
    fn apply(&mut self, op: Op) -> StoreResult<()> {
        match op {
            Op::UpdateWork {
                id,
                assert,
                set_status,
                push_attempt,
            } => {
                let item = self.work.get_mut(&id).ok_or(StoreError::Aborted)?;
                if item.status != assert.status || item.rev != assert.rev {
                    return Err(StoreError::Aborted);
                }
                if let Some(head) = assert.attempt_head {
                    if item.attempt_head().map(|a| a.id) != Some(head) {
                        return Err(StoreError::Aborted);
                    }
                }
                item.status = set_status;
                item.rev += 1;
                if let Some(attempt) = push_attempt {
                    item.attempt_log.insert(0, attempt);
                }
            }
            Op::InsertWork(item) => {
                if self.work.contains_key(&item.id) {
                    return Err(StoreError::Aborted);
                }
                self.work.insert(item.id, item);
            }
            Op::InsertWorkResult(result) => {
                if self.results.contains_key(&result.id) {
                    return Err(StoreError::Aborted);
                }
                self.results.insert(result.id, result);
            }
            Op::InsertTestResult(test) => {
                if self.tests.contains_key(&test.id) {
                    return Err(StoreError::Aborted);
                }
                self.tests.insert(test.id, test);
            }
            Op::InsertNotification(not) => {
                if self.notifications.contains_key(&not.id) {
                    return Err(StoreError::Aborted);
                }
                self.notifications.insert(not.id, not);
            }
            Op::SetNotificationStatus { id, status } => {
                let not = self.notifications.get_mut(&id).ok_or(StoreError::Aborted)?;
                not.status = status;
            }
        }
        Ok(())
    }
}

/// Process-local store, suitable for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn run(&self, ops: Vec<Op>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut staged = inner.clone();
        for op in ops {
            staged.apply(op)?;
        }
        *inner = staged;
        Ok(())
    }

    async fn work_item(&self, id: ResourceId) -> StoreResult<Option<WorkItem>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.work.get(&id).cloned())
    }

    async fn leasable_work(
        &self,
        now: DateTime<Utc>,
        attempt_timeout: Duration,
    ) -> StoreResult<Vec<WorkItem>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut items: Vec<WorkItem> = inner
            .work
            .values()
            .filter(|item| match item.status {
                WorkStatus::Queued => true,
                WorkStatus::Processing => item
                    .attempt_head()
                    .map(|a| now - a.created_at > attempt_timeout)
                    .unwrap_or(false),
                WorkStatus::Completed => false,
            })
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn work_results(&self, work_id: ResourceId) -> StoreResult<Vec<WorkResult>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .results
            .values()
            .filter(|r| r.work_id == work_id)
            .cloned()
            .collect())
    }

    async fn test_results(&self, work_result_id: ResourceId) -> StoreResult<Vec<TestResult>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .tests
            .values()
            .filter(|t| t.work_result_id == work_result_id)
            .cloned()
            .collect())
    }

    async fn waiting_notifications(&self) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .notifications
            .values()
            .filter(|n| n.status == gantry_core::NotifStatus::Waiting)
            .cloned()
            .collect())
    }

    async fn upsert_worker(&self, worker: WorkerRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.workers.insert(worker.id, worker);
        Ok(())
    }

    async fn remove_worker(&self, id: ResourceId) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.workers.remove(&id);
        Ok(())
    }

    async fn ping_worker(&self, id: ResourceId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(worker) = inner.workers.get_mut(&id) {
            worker.last_seen = now;
        }
        Ok(())
    }

    async fn workers(&self, kind: WorkerKind) -> StoreResult<Vec<WorkerRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut workers: Vec<WorkerRecord> = inner
            .workers
            .values()
            .filter(|w| w.kind == kind)
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.id.as_uuid().as_u128());
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkAssert;
    use gantry_core::{AttemptEntry, Vcs, WorkSpec};

    fn make_item() -> WorkItem {
        WorkItem::from_spec(
            WorkSpec {
                import_path: "github.com/acme/widget".to_string(),
                revision: "deadbeef".to_string(),
                revision_date: Utc::now(),
                subpackages: false,
                vcs: Vcs::Git,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_update_increments_rev_once() {
        let store = MemoryStore::new();
        let item = make_item();
        let id = item.id;
        store.run(vec![Op::InsertWork(item)]).await.unwrap();

        store
            .run(vec![Op::UpdateWork {
                id,
                assert: WorkAssert {
                    status: WorkStatus::Queued,
                    attempt_head: None,
                    rev: 0,
                },
                set_status: WorkStatus::Processing,
                push_attempt: Some(AttemptEntry::new(Utc::now())),
            }])
            .await
            .unwrap();

        let item = store.work_item(id).await.unwrap().unwrap();
        assert_eq!(item.rev, 1);
        assert_eq!(item.status, WorkStatus::Processing);
        assert_eq!(item.attempt_log.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_rev_aborts() {
        let store = MemoryStore::new();
        let item = make_item();
        let id = item.id;
        store.run(vec![Op::InsertWork(item)]).await.unwrap();

        let err = store
            .run(vec![Op::UpdateWork {
                id,
                assert: WorkAssert {
                    status: WorkStatus::Queued,
                    attempt_head: None,
                    rev: 7,
                },
                set_status: WorkStatus::Processing,
                push_attempt: None,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted));

        // Nothing moved.
        let item = store.work_item(id).await.unwrap().unwrap();
        assert_eq!(item.rev, 0);
        assert_eq!(item.status, WorkStatus::Queued);
    }

    #[tokio::test]
    async fn test_abort_mid_list_writes_nothing() {
        let store = MemoryStore::new();
        let item = make_item();
        let id = item.id;
        store.run(vec![Op::InsertWork(item)]).await.unwrap();

        let result = WorkResult {
            id: ResourceId::new(),
            work_id: id,
            success: true,
            revision: "deadbeef".to_string(),
            revision_date: None,
            completed_at: Utc::now(),
            error: None,
        };

        // The insert is listed first, the failing assert second: neither
        // may be visible afterwards.
        let err = store
            .run(vec![
                Op::InsertWorkResult(result),
                Op::UpdateWork {
                    id,
                    assert: WorkAssert {
                        status: WorkStatus::Processing,
                        attempt_head: None,
                        rev: 0,
                    },
                    set_status: WorkStatus::Completed,
                    push_attempt: None,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted));
        assert!(store.work_results(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leasable_work_includes_expired_attempts() {
        let store = MemoryStore::new();
        let queued = make_item();
        let queued_id = queued.id;

        let mut stale = make_item();
        stale.status = WorkStatus::Processing;
        stale.rev = 1;
        stale.attempt_log.insert(
            0,
            AttemptEntry::new(Utc::now() - Duration::seconds(600)),
        );
        let stale_id = stale.id;

        let mut fresh = make_item();
        fresh.status = WorkStatus::Processing;
        fresh.rev = 1;
        fresh.attempt_log.insert(0, AttemptEntry::new(Utc::now()));

        store
            .run(vec![
                Op::InsertWork(queued),
                Op::InsertWork(stale),
                Op::InsertWork(fresh),
            ])
            .await
            .unwrap();

        let leasable = store
            .leasable_work(Utc::now(), Duration::seconds(90))
            .await
            .unwrap();
        let ids: Vec<ResourceId> = leasable.iter().map(|i| i.id).collect();
        assert!(ids.contains(&queued_id));
        assert!(ids.contains(&stale_id));
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_attempt_head_assert() {
        let store = MemoryStore::new();
        let mut item = make_item();
        item.status = WorkStatus::Processing;
        item.rev = 1;
        let old = AttemptEntry::new(Utc::now());
        let newer = AttemptEntry::new(Utc::now());
        item.attempt_log.insert(0, old.clone());
        item.attempt_log.insert(0, newer.clone());
        let id = item.id;
        store.run(vec![Op::InsertWork(item)]).await.unwrap();

        // Only the head attempt may complete the item.
        let err = store
            .run(vec![Op::UpdateWork {
                id,
                assert: WorkAssert {
                    status: WorkStatus::Processing,
                    attempt_head: Some(old.id),
                    rev: 1,
                },
                set_status: WorkStatus::Completed,
                push_attempt: None,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted));

        store
            .run(vec![Op::UpdateWork {
                id,
                assert: WorkAssert {
                    status: WorkStatus::Processing,
                    attempt_head: Some(newer.id),
                    rev: 1,
                },
                set_status: WorkStatus::Completed,
                push_attempt: None,
            }])
            .await
            .unwrap();
    }
}
