//! Wire types shared by the RPC services.

use chrono::{DateTime, Utc};
use gantry_core::{ResourceId, TriggerConfig, WorkSpec, WorkerKind, WorkerRecord};
use serde::{Deserialize, Serialize};

/// Reported sub-test output kinds. Kinds travel as plain strings so an
/// unrecognized value reaches the recorder, which rejects the whole commit.
pub const OUTPUT_SUCCESS: &str = "success";
pub const OUTPUT_WONT_BUILD: &str = "wontbuild";
pub const OUTPUT_ERROR: &str = "error";

/// Output of one sub-test as reported by a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutput {
    pub kind: String,
    pub import_path: String,
    pub output: String,
    #[serde(default)]
    pub config: TriggerConfig,
}

/// `Response.Post` arguments: a successful run with sub-test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResponse {
    /// Work item id.
    pub key: ResourceId,
    /// Attempt this response belongs to.
    pub attempt_id: ResourceId,
    /// Revision counter the caller last observed.
    pub work_rev: i64,
    pub revision: String,
    pub revision_date: Option<DateTime<Utc>>,
    pub tests: Vec<TestOutput>,
}

/// `Response.Error` arguments: the build failed before any test ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderResponse {
    pub key: ResourceId,
    pub attempt_id: ResourceId,
    pub work_rev: i64,
    pub revision: String,
    pub revision_date: Option<DateTime<Utc>>,
    pub error: String,
}

/// `Response.DispatchError` arguments: the dispatcher gave up on the item.
/// No attempt id: by the time dispatch is abandoned the attempt entry may
/// already be gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub key: ResourceId,
    pub work_rev: i64,
    pub error: String,
}

/// `Tracker.Announce` arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announce {
    pub kind: WorkerKind,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceReply {
    pub key: ResourceId,
}

/// `Tracker.Ping` / `Tracker.Remove` arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerKey {
    pub key: ResourceId,
}

/// A leased attempt as pushed to a builder's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasedWork {
    pub work_id: ResourceId,
    pub attempt_id: ResourceId,
    /// Revision counter after the lease transaction committed.
    pub work_rev: i64,
    pub spec: WorkSpec,
}

/// `Tracker.LeasePair` reply: one builder, one runner, one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseGrant {
    pub builder: WorkerRecord,
    pub runner: WorkerRecord,
    pub work: LeasedWork,
}
