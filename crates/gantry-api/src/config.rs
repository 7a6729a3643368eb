//! Hub configuration, read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Settings for the hub binary. Every field has a development default.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address the HTTP server binds.
    pub bind: SocketAddr,
    /// Externally reachable base URL, used for the notification trigger.
    pub base_url: String,
    /// PostgreSQL URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Age after which a Processing item's newest attempt is considered
    /// abandoned and the item becomes leasable again.
    pub attempt_timeout: Duration,
    /// Poll interval of the dispatcher loop.
    pub dispatch_interval: Duration,
    /// Push tries per grant before the dispatcher gives up on an item.
    pub dispatch_retries: u32,
}

impl HubConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("GANTRY_BIND")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;
        let base_url = std::env::var("GANTRY_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let database_url = std::env::var("DATABASE_URL").ok();
        let attempt_timeout = env_secs("GANTRY_ATTEMPT_TIMEOUT_SECS", 300)?;
        let dispatch_interval = env_secs("GANTRY_DISPATCH_INTERVAL_SECS", 5)?;
        let dispatch_retries = std::env::var("GANTRY_DISPATCH_RETRIES")
            .map(|v| v.parse())
            .unwrap_or(Ok(3))?;
        Ok(Self {
            bind,
            base_url,
            database_url,
            attempt_timeout,
            dispatch_interval,
            dispatch_retries,
        })
    }
}

fn env_secs(name: &str, default: u64) -> anyhow::Result<Duration> {
    let secs = match std::env::var(name) {
        Ok(v) => v.parse()?,
        Err(_) => default,
    };
    Ok(Duration::from_secs(secs))
}
