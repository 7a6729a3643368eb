//! Work items, attempt logs, and work descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Version control system a work item was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vcs {
    Git,
    Mercurial,
}

/// Lifecycle of a work item.
///
/// Transitions are one-way: Queued -> Processing -> Completed. A Processing
/// item whose newest attempt has expired may be re-leased, which appends
/// another attempt-log entry but does not move the status backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Queued,
    Processing,
    Completed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Queued => "queued",
            WorkStatus::Processing => "processing",
            WorkStatus::Completed => "completed",
        }
    }
}

/// One lease-scoped execution try, newest entry at the head of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub id: ResourceId,
    pub created_at: DateTime<Utc>,
}

impl AttemptEntry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: ResourceId::new(),
            created_at: now,
        }
    }
}

/// A work descriptor: what to build and test, before it becomes durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSpec {
    /// Import path of the package under test.
    pub import_path: String,
    /// Source revision to check out.
    pub revision: String,
    /// Commit date of the revision.
    pub revision_date: DateTime<Utc>,
    /// Whether subpackages are built and tested as well.
    pub subpackages: bool,
    pub vcs: Vcs,
}

/// One build/test job tied to a source revision.
///
/// `rev` is the monotonic revision counter used as the optimistic-concurrency
/// token: every committed mutation increments it by exactly 1, and every
/// conditional transaction asserts the value it last read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ResourceId,
    pub import_path: String,
    pub revision: String,
    pub revision_date: DateTime<Utc>,
    pub subpackages: bool,
    pub vcs: Vcs,
    pub status: WorkStatus,
    pub rev: i64,
    pub attempt_log: Vec<AttemptEntry>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a fresh Queued item from a descriptor.
    pub fn from_spec(spec: WorkSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: ResourceId::new(),
            import_path: spec.import_path,
            revision: spec.revision,
            revision_date: spec.revision_date,
            subpackages: spec.subpackages,
            vcs: spec.vcs,
            status: WorkStatus::Queued,
            rev: 0,
            attempt_log: Vec::new(),
            created_at: now,
        }
    }

    /// The newest attempt, if any. Only the head may legitimately complete
    /// the item.
    pub fn attempt_head(&self) -> Option<&AttemptEntry> {
        self.attempt_log.first()
    }

    /// The descriptor this item was created from.
    pub fn spec(&self) -> WorkSpec {
        WorkSpec {
            import_path: self.import_path.clone(),
            revision: self.revision.clone(),
            revision_date: self.revision_date,
            subpackages: self.subpackages,
            vcs: self.vcs,
        }
    }
}
