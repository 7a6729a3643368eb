//! Shared hub state.

use std::sync::Arc;
use std::time::Duration;

use gantry_store::Store;

/// State shared by every service and route handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Externally reachable base URL of this hub.
    pub base_url: String,
    pub http: reqwest::Client,
    /// Age after which a live attempt is treated as abandoned.
    pub attempt_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, base_url: impl Into<String>, attempt_timeout: Duration) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            attempt_timeout,
        }
    }

    /// Attempt timeout as a chrono duration, for store queries.
    pub fn attempt_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.attempt_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300))
    }
}
