//! Building the test binary for a leased attempt.
//!
//! The toolchain integration is a collaborator behind a trait; the stock
//! implementation shells out to a configured build command.

use std::path::PathBuf;

use async_trait::async_trait;
use gantry_core::{Error, Result, TriggerConfig, WorkSpec};
use tokio::process::Command;
use tracing::info;

/// A built test binary ready for a runner to fetch.
#[derive(Debug, Clone)]
pub struct BuiltTest {
    pub import_path: String,
    pub binary_path: PathBuf,
    pub config: TriggerConfig,
}

#[async_trait]
pub trait TestBuilder: Send + Sync {
    async fn build(&self, spec: &WorkSpec) -> Result<BuiltTest>;
}

/// Runs a configured shell command with the work descriptor in its
/// environment. The command prints the produced binary path on its last
/// stdout line.
pub struct CommandBuilder {
    command: String,
}

impl CommandBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TestBuilder for CommandBuilder {
    async fn build(&self, spec: &WorkSpec) -> Result<BuiltTest> {
        info!(path = %spec.import_path, revision = %spec.revision, "building");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("GANTRY_IMPORT_PATH", &spec.import_path)
            .env("GANTRY_REVISION", &spec.revision)
            .env("GANTRY_SUBPACKAGES", if spec.subpackages { "1" } else { "0" })
            .output()
            .await
            .map_err(|e| Error::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Internal(format!(
                "build command failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let binary = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .next_back()
            .ok_or_else(|| Error::Internal("build command printed no binary path".to_string()))?;

        Ok(BuiltTest {
            import_path: spec.import_path.clone(),
            binary_path: PathBuf::from(binary.trim()),
            config: TriggerConfig::default(),
        })
    }
}
