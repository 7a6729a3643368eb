//! Registry of outstanding attempts.
//!
//! One mutex guards the map; completion and timeout both remove through
//! [`ActiveRegistry::take`] while holding it, so exactly one side wins and
//! at most one completion event is emitted per attempt. The mutex is never
//! held across an await.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gantry_core::{ResourceId, TriggerConfig};
use gantry_rpc::wire::LeasedWork;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Spawned,
    Running,
    Finished,
    Errored,
    TimedOut,
}

/// Runtime record of one outstanding attempt.
#[derive(Debug, Clone)]
pub struct ActiveTest {
    pub work: LeasedWork,
    pub binary_path: PathBuf,
    pub config: TriggerConfig,
    pub state: AttemptState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: String,
    pub error: Option<String>,
}

impl ActiveTest {
    pub fn new(work: LeasedWork, binary_path: PathBuf, config: TriggerConfig) -> Self {
        Self {
            work,
            binary_path,
            config,
            state: AttemptState::Spawned,
            started_at: None,
            finished_at: None,
            output: String::new(),
            error: None,
        }
    }
}

/// Owner of the outstanding-attempt map. Completed attempts are emitted on
/// the channel handed out by [`ActiveRegistry::new`].
#[derive(Clone)]
pub struct ActiveRegistry {
    inner: Arc<Mutex<HashMap<ResourceId, ActiveTest>>>,
    done: mpsc::UnboundedSender<ActiveTest>,
}

impl ActiveRegistry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ActiveTest>) {
        let (done, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Mutex::new(HashMap::new())),
                done,
            },
            rx,
        )
    }

    pub fn insert(&self, test: ActiveTest) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert(test.work.attempt_id, test);
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.contains_key(&id)
    }

    /// Binary path for an outstanding attempt, without touching its state.
    pub fn binary_path(&self, id: ResourceId) -> Option<PathBuf> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(&id).map(|t| t.binary_path.clone())
    }

    /// Mark the attempt Running (the runner fetched its binary) and return
    /// the binary path. `None` for an unknown id.
    pub fn start(&self, id: ResourceId) -> Option<PathBuf> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let test = inner.get_mut(&id)?;
        test.state = AttemptState::Running;
        test.started_at = Some(Utc::now());
        Some(test.binary_path.clone())
    }

    /// Legitimate completion with output. Returns false when the attempt is
    /// no longer outstanding (already completed or timed out).
    pub fn finish(&self, id: ResourceId, output: String) -> bool {
        self.complete(id, |test| {
            test.state = AttemptState::Finished;
            test.output = output;
        })
    }

    /// Failure path. `timed_out` distinguishes the deadline from reported
    /// errors. Returns false when the attempt is no longer outstanding.
    pub fn fail(&self, id: ResourceId, error: String, timed_out: bool) -> bool {
        self.complete(id, |test| {
            test.state = if timed_out {
                AttemptState::TimedOut
            } else {
                AttemptState::Errored
            };
            test.error = Some(error);
        })
    }

    /// Take-and-mark under the lock: the atomic "is outstanding" check plus
    /// transition.
    fn complete(&self, id: ResourceId, mark: impl FnOnce(&mut ActiveTest)) -> bool {
        let Some(mut test) = self.take(id) else {
            return false;
        };
        mark(&mut test);
        test.finished_at = Some(Utc::now());
        info!(attempt = %id, state = ?test.state, "attempt complete");
        let _ = self.done.send(test);
        true
    }

    fn take(&self, id: ResourceId) -> Option<ActiveTest> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gantry_core::{Vcs, WorkSpec};

    fn make_test() -> ActiveTest {
        ActiveTest::new(
            LeasedWork {
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
            },
            PathBuf::from("/tmp/widget.test"),
            TriggerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_finish_and_timeout_race_single_winner() {
        let (registry, mut done) = ActiveRegistry::new();
        let test = make_test();
        let id = test.work.attempt_id;
        registry.insert(test);

        assert!(registry.finish(id, "ok\nPASS\n".to_string()));
        // The late timeout loses and is a no-op.
        assert!(!registry.fail(id, "timeout".to_string(), true));

        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::Finished);
        assert!(done.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_beats_late_completion() {
        let (registry, mut done) = ActiveRegistry::new();
        let test = make_test();
        let id = test.work.attempt_id;
        registry.insert(test);

        assert!(registry.fail(id, "timeout".to_string(), true));
        assert!(!registry.finish(id, "late".to_string()));

        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::TimedOut);
        assert_eq!(completed.error.as_deref(), Some("timeout"));
        assert!(done.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_marks_running() {
        let (registry, _done) = ActiveRegistry::new();
        let test = make_test();
        let id = test.work.attempt_id;
        registry.insert(test);

        let path = registry.start(id).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/widget.test"));
        assert!(registry.contains(id));
        assert!(registry.start(ResourceId::new()).is_none());
    }
}
