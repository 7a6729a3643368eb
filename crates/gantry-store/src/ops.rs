//! Typed operations for conditional multi-document transactions.

use gantry_core::{
    AttemptEntry, NotifStatus, Notification, ResourceId, TestResult, WorkItem, WorkResult,
    WorkStatus,
};

/// Field equalities asserted against the live work item before any write in
/// the transaction applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAssert {
    pub status: WorkStatus,
    /// When set, the id of the attempt-log head must match. The
    /// dispatch-abandoned completion shape omits this check.
    pub attempt_head: Option<ResourceId>,
    /// Expected value of the optimistic-concurrency counter.
    pub rev: i64,
}

/// One operation inside a transaction.
#[derive(Debug, Clone)]
pub enum Op {
    /// Conditionally mutate a work item. The revision counter is always
    /// incremented by exactly 1 on success; there is no other way to
    /// change it.
    UpdateWork {
        id: ResourceId,
        assert: WorkAssert,
        set_status: WorkStatus,
        /// Pushed at the head of the attempt log (newest first).
        push_attempt: Option<AttemptEntry>,
    },
    InsertWork(WorkItem),
    InsertWorkResult(WorkResult),
    InsertTestResult(TestResult),
    InsertNotification(Notification),
    SetNotificationStatus { id: ResourceId, status: NotifStatus },
}
