//! Notification records and trigger configuration.

use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Per-test notification trigger configuration, carried alongside the
/// reported output. An empty `notify_on` means the sub-test never triggers
/// a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Condition the notification fires on, e.g. "failure" or "change".
    #[serde(default)]
    pub notify_on: String,
    /// Endpoint to signal when the notification is delivered.
    #[serde(default)]
    pub endpoint: String,
}

impl TriggerConfig {
    pub fn is_empty(&self) -> bool {
        self.notify_on.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifStatus {
    Waiting,
    Sent,
    Failed,
}

impl NotifStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifStatus::Waiting => "waiting",
            NotifStatus::Sent => "sent",
            NotifStatus::Failed => "failed",
        }
    }
}

/// A pending or delivered notification for one TestResult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: ResourceId,
    pub test_id: ResourceId,
    pub config: TriggerConfig,
    pub status: NotifStatus,
}
