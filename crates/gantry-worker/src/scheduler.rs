//! Run scheduler: spawns and supervises one runner process per attempt.
//!
//! Attempt lifecycle: Spawned -> Running -> {Finished | Errored | TimedOut}.
//! The only cancellation mechanism is the deadline timer; past it the
//! attempt is marked failed first and the process culled second, so a kill
//! that goes wrong can never leave the attempt dangling.

use std::sync::Arc;
use std::time::Duration;

use gantry_core::ResourceId;
use tracing::{info, warn};

use crate::procs::ProcessManager;
use crate::registry::ActiveRegistry;

/// Default deadline for a runner process.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct RunScheduler {
    procs: Arc<dyn ProcessManager>,
    registry: ActiveRegistry,
    /// Externally reachable base URL of this builder, embedded in the
    /// runner's callback URL.
    base_url: String,
    deadline: Duration,
    /// When false, processes are neither spawned for real nor culled
    /// (debug mode).
    process_control: bool,
}

impl RunScheduler {
    pub fn new(
        procs: Arc<dyn ProcessManager>,
        registry: ActiveRegistry,
        base_url: impl Into<String>,
        deadline: Duration,
        process_control: bool,
    ) -> Self {
        Self {
            procs,
            registry,
            base_url: base_url.into(),
            deadline,
            process_control,
        }
    }

    /// Callback URL prefix handed to the runner for one attempt.
    pub fn attempt_url(&self, id: ResourceId) -> String {
        format!("{}/test/{}", self.base_url.trim_end_matches('/'), id)
    }

    /// Spawn the runner for a registered attempt and arm its deadline.
    /// A spawn failure fails the attempt immediately; it never reaches
    /// Running.
    ///
    /// With process control disabled no process is started at all; a runner
    /// driven by hand reports through the same callback URL, and the
    /// deadline still expires the attempt if nothing does.
    pub async fn schedule(&self, id: ResourceId) {
        if !self.process_control {
            info!(attempt = %id, url = %self.attempt_url(id), "process control disabled, not spawning");
            self.arm_deadline(id, String::new());
            return;
        }

        let cmd = format!("bin/runner {}", self.attempt_url(id));
        let proc = match self.procs.run(&cmd).await {
            Ok(proc) => proc,
            Err(e) => {
                self.registry.fail(id, format!("error spawning: {e}"), false);
                return;
            }
        };
        info!(attempt = %id, proc = %proc.id, "spawned runner");
        self.arm_deadline(id, proc.id);
    }

    fn arm_deadline(&self, id: ResourceId, proc_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.deadline).await;
            this.cull(id, proc_id).await;
        });
    }

    /// Deadline handler. `fail` is the atomic outstanding-check plus
    /// transition: when the attempt already completed this is a no-op.
    /// Lookup or kill failures only get logged; the attempt is already
    /// marked failed either way.
    async fn cull(&self, id: ResourceId, proc_id: String) {
        if !self.registry.fail(id, "timeout".to_string(), true) {
            return;
        }
        warn!(attempt = %id, proc = %proc_id, "attempt timed out, culling runner");

        if !self.process_control {
            return;
        }

        let procs = match self.procs.list().await {
            Ok(procs) => procs,
            Err(e) => {
                warn!(attempt = %id, proc = %proc_id, error = %e, "error culling (list)");
                return;
            }
        };
        let Some(pid) = procs
            .iter()
            .find(|p| p.id == proc_id)
            .map(|p| p.process.clone())
        else {
            warn!(attempt = %id, proc = %proc_id, "couldn't cull: process not found");
            return;
        };
        if let Err(e) = self.procs.kill(&pid).await {
            warn!(attempt = %id, proc = %proc_id, error = %e, "error culling (kill)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procs::{ProcHandle, ProcInfo};
    use crate::registry::{ActiveTest, AttemptState};
    use async_trait::async_trait;
    use chrono::Utc;
    use gantry_core::{Error, Result, TriggerConfig, Vcs, WorkSpec};
    use gantry_rpc::wire::LeasedWork;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProcs {
        fail_spawn: bool,
        spawned: Mutex<Vec<String>>,
        killed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProcessManager for MockProcs {
        async fn run(&self, cmd: &str) -> Result<ProcHandle> {
            if self.fail_spawn {
                return Err(Error::SpawnFailed("no capacity".to_string()));
            }
            self.spawned.lock().unwrap().push(cmd.to_string());
            Ok(ProcHandle {
                id: "proc-1".to_string(),
            })
        }

        async fn list(&self) -> Result<Vec<ProcInfo>> {
            Ok(vec![ProcInfo {
                id: "proc-1".to_string(),
                process: "1234".to_string(),
            }])
        }

        async fn kill(&self, process: &str) -> Result<()> {
            self.killed
                .lock()
                .unwrap()
                .push(process.to_string());
            Ok(())
        }
    }

    fn register_attempt(registry: &ActiveRegistry) -> ResourceId {
        let work = LeasedWork {
            work_id: ResourceId::new(),
            attempt_id: ResourceId::new(),
            work_rev: 1,
            spec: WorkSpec {
                import_path: "github.com/acme/widget".to_string(),
                revision: "deadbeef".to_string(),
                revision_date: Utc::now(),
                subpackages: false,
                vcs: Vcs::Git,
            },
        };
        let id = work.attempt_id;
        registry.insert(ActiveTest::new(
            work,
            "/tmp/widget.test".into(),
            TriggerConfig::default(),
        ));
        id
    }

    fn make_scheduler(
        procs: Arc<MockProcs>,
        registry: ActiveRegistry,
        deadline: Duration,
    ) -> RunScheduler {
        RunScheduler::new(procs, registry, "http://builder:8080", deadline, true)
    }

    #[tokio::test]
    async fn test_spawn_failure_fails_attempt() {
        let (registry, mut done) = ActiveRegistry::new();
        let procs = Arc::new(MockProcs {
            fail_spawn: true,
            ..Default::default()
        });
        let scheduler = make_scheduler(procs, registry.clone(), DEFAULT_DEADLINE);

        let id = register_attempt(&registry);
        scheduler.schedule(id).await;

        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::Errored);
        assert!(completed.error.unwrap().contains("error spawning"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_culls_outstanding_attempt() {
        let (registry, mut done) = ActiveRegistry::new();
        let procs = Arc::new(MockProcs::default());
        let scheduler = make_scheduler(procs.clone(), registry.clone(), DEFAULT_DEADLINE);

        let id = register_attempt(&registry);
        scheduler.schedule(id).await;

        tokio::time::sleep(DEFAULT_DEADLINE + Duration::from_secs(1)).await;

        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::TimedOut);
        assert_eq!(completed.error.as_deref(), Some("timeout"));
        assert_eq!(*procs.killed.lock().unwrap(), vec!["1234".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_before_deadline_skips_cull() {
        let (registry, mut done) = ActiveRegistry::new();
        let procs = Arc::new(MockProcs::default());
        let scheduler = make_scheduler(procs.clone(), registry.clone(), DEFAULT_DEADLINE);

        let id = register_attempt(&registry);
        scheduler.schedule(id).await;

        assert!(registry.finish(id, "ok\nPASS\n".to_string()));
        tokio::time::sleep(DEFAULT_DEADLINE + Duration::from_secs(1)).await;

        // Exactly one completion, and nothing was killed.
        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::Finished);
        assert!(done.try_recv().is_err());
        assert!(procs.killed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_control_disabled_spawns_and_kills_nothing() {
        let (registry, mut done) = ActiveRegistry::new();
        let procs = Arc::new(MockProcs::default());
        let scheduler = RunScheduler::new(
            procs.clone(),
            registry.clone(),
            "http://builder:8080",
            DEFAULT_DEADLINE,
            false,
        );

        let id = register_attempt(&registry);
        scheduler.schedule(id).await;
        assert!(procs.spawned.lock().unwrap().is_empty());

        // The deadline still expires the attempt, without any kill.
        tokio::time::sleep(DEFAULT_DEADLINE + Duration::from_secs(1)).await;
        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::TimedOut);
        assert!(procs.killed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_control_disabled_callback_still_completes() {
        let (registry, mut done) = ActiveRegistry::new();
        let procs = Arc::new(MockProcs::default());
        let scheduler = RunScheduler::new(
            procs.clone(),
            registry.clone(),
            "http://builder:8080",
            DEFAULT_DEADLINE,
            false,
        );

        let id = register_attempt(&registry);
        scheduler.schedule(id).await;
        assert!(registry.finish(id, "ok\nPASS\n".to_string()));

        tokio::time::sleep(DEFAULT_DEADLINE + Duration::from_secs(1)).await;
        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::Finished);
        assert!(done.try_recv().is_err());
    }
}
