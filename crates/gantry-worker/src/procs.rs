//! Process management seam.
//!
//! The scheduler treats process control as an opaque API: run a command,
//! list what is running, kill by process reference. A hosted platform
//! client implements the same shape; [`LocalProcessManager`] runs commands
//! on this machine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use gantry_core::{Error, ResourceId, Result};
use tokio::process::{Child, Command};

/// Handle returned when a command is started.
#[derive(Debug, Clone)]
pub struct ProcHandle {
    pub id: String,
}

/// One running process as reported by `list`.
#[derive(Debug, Clone)]
pub struct ProcInfo {
    pub id: String,
    pub process: String,
}

#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn run(&self, cmd: &str) -> Result<ProcHandle>;
    async fn list(&self) -> Result<Vec<ProcInfo>>;
    async fn kill(&self, process: &str) -> Result<()>;
}

/// Runs commands through the local shell.
#[derive(Default)]
pub struct LocalProcessManager {
    children: Mutex<HashMap<String, Child>>,
}

impl LocalProcessManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessManager for LocalProcessManager {
    async fn run(&self, cmd: &str) -> Result<ProcHandle> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .spawn()
            .map_err(|e| Error::SpawnFailed(e.to_string()))?;
        let id = ResourceId::new().to_string();
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        children.insert(id.clone(), child);
        Ok(ProcHandle { id })
    }

    async fn list(&self) -> Result<Vec<ProcInfo>> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        // Drop entries whose process has already exited.
        children.retain(|_, child| matches!(child.try_wait(), Ok(None)));
        Ok(children
            .iter()
            .map(|(id, child)| ProcInfo {
                id: id.clone(),
                process: child.id().map(|pid| pid.to_string()).unwrap_or_default(),
            })
            .collect())
    }

    async fn kill(&self, process: &str) -> Result<()> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let id = children
            .iter()
            .find(|(_, child)| {
                child.id().map(|pid| pid.to_string()).as_deref() == Some(process)
            })
            .map(|(id, _)| id.clone())
            .ok_or_else(|| Error::NotFound(format!("process {process}")))?;
        let mut child = children.remove(&id).ok_or_else(|| {
            Error::NotFound(format!("process {process}"))
        })?;
        child
            .start_kill()
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }
}
