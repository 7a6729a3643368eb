//! Work and test results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Classification of a single sub-test's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    WontBuild,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::WontBuild => "wontbuild",
            TestStatus::Error => "error",
        }
    }
}

/// Outcome of one attempt at a work item. At most one is ever committed per
/// attempt id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    pub id: ResourceId,
    pub work_id: ResourceId,
    pub success: bool,
    pub revision: String,
    pub revision_date: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    /// Error text when the attempt failed.
    pub error: Option<String>,
}

/// One sub-test outcome belonging to a WorkResult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: ResourceId,
    pub work_result_id: ResourceId,
    pub import_path: String,
    pub revision: String,
    pub revision_date: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
    pub output: String,
    pub status: TestStatus,
}
