//! Worker (builder/runner) registration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Builder,
    Runner,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Builder => "builder",
            WorkerKind::Runner => "runner",
        }
    }
}

/// A registered worker process.
///
/// `last_seen` is updated by heartbeats for dashboards only; it never
/// governs lease expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: ResourceId,
    pub kind: WorkerKind,
    pub url: String,
    pub last_seen: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(kind: WorkerKind, url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ResourceId::new(),
            kind,
            url: url.into(),
            last_seen: now,
        }
    }
}
