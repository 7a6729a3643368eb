//! Builder configuration, read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Settings for the builder binary. Every field has a development default.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the HTTP server binds.
    pub bind: SocketAddr,
    /// Externally reachable base URL of this builder, embedded in runner
    /// callback URLs.
    pub base_url: String,
    /// Base URL of the hub.
    pub hub_url: String,
    /// Shell command producing the test binary (its last stdout line).
    pub build_command: String,
    /// Deadline for one runner process.
    pub deadline: Duration,
    /// Disable real process spawning and culling (debug mode).
    pub process_control: bool,
    /// Also announce this host as a runner.
    pub announce_runner: bool,
    /// Heartbeat interval.
    pub ping_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("GANTRY_BIND")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()?;
        let base_url = std::env::var("GANTRY_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3001".to_string());
        let hub_url =
            std::env::var("GANTRY_HUB_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let build_command = std::env::var("GANTRY_BUILD_COMMAND")
            .unwrap_or_else(|_| "bin/build-test".to_string());
        let deadline = env_secs("GANTRY_RUN_DEADLINE_SECS", 90)?;
        let process_control = std::env::var("GANTRY_NO_PROCESS_CONTROL").is_err();
        let announce_runner = std::env::var("GANTRY_ANNOUNCE_RUNNER").is_ok();
        let ping_interval = env_secs("GANTRY_PING_INTERVAL_SECS", 30)?;
        Ok(Self {
            bind,
            base_url,
            hub_url,
            build_command,
            deadline,
            process_control,
            announce_runner,
            ping_interval,
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
