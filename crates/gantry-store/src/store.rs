//! The store trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gantry_core::{
    Notification, ResourceId, TestResult, WorkItem, WorkResult, WorkerKind, WorkerRecord,
};

use crate::{Op, StoreResult};

/// A durable store offering multi-document conditional transactions.
///
/// `run` is all-or-nothing: if any assertion in the operation list fails
/// against live state, nothing is written and `StoreError::Aborted` is
/// returned. Reads are plain queries with no transactional guarantees
/// beyond single-document consistency; callers re-validate through `run`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn run(&self, ops: Vec<Op>) -> StoreResult<()>;

    async fn work_item(&self, id: ResourceId) -> StoreResult<Option<WorkItem>>;

    /// Items eligible for leasing: Queued items, plus Processing items whose
    /// newest attempt started more than `attempt_timeout` before `now`.
    async fn leasable_work(
        &self,
        now: DateTime<Utc>,
        attempt_timeout: Duration,
    ) -> StoreResult<Vec<WorkItem>>;

    async fn work_results(&self, work_id: ResourceId) -> StoreResult<Vec<WorkResult>>;

    async fn test_results(&self, work_result_id: ResourceId) -> StoreResult<Vec<TestResult>>;

    async fn waiting_notifications(&self) -> StoreResult<Vec<Notification>>;

    async fn upsert_worker(&self, worker: WorkerRecord) -> StoreResult<()>;

    async fn remove_worker(&self, id: ResourceId) -> StoreResult<()>;

    /// Record a heartbeat. Unknown workers are ignored.
    async fn ping_worker(&self, id: ResourceId, now: DateTime<Utc>) -> StoreResult<()>;

    async fn workers(&self, kind: WorkerKind) -> StoreResult<Vec<WorkerRecord>>;
}
