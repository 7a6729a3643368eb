//! The `Response` recorder service.
//!
//! Commits job outcomes through conditional transactions. Three shapes:
//! success with sub-test results, build error without results, and dispatch
//! abandonment. A lost race against another recorder is a benign no-op;
//! the transaction abort is the only arbiter.

use chrono::Utc;
use gantry_core::{
    Error, NotifStatus, Notification, ResourceId, Result, TestResult, TestStatus, WorkResult,
    WorkStatus,
};
use gantry_rpc::wire::{
    BuilderResponse, DispatchResponse, OUTPUT_ERROR, OUTPUT_SUCCESS, OUTPUT_WONT_BUILD,
    RunnerResponse, TestOutput,
};
use gantry_store::{Op, Store, StoreError, WorkAssert};
use tracing::{debug, warn};

use crate::AppState;

/// Output text a passing test run ends with.
const PASS_MARKER: &str = "\nPASS\n";

#[derive(Clone)]
pub struct ResponseService {
    state: AppState,
}

impl ResponseService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Record a successful run with its sub-test results.
    pub async fn post(&self, args: RunnerResponse) -> Result<()> {
        let triggered = self.record_post(args).await?;
        if triggered > 0 {
            self.trigger_dispatch();
        }
        Ok(())
    }

    /// The commit behind `post`, returning how many notifications were
    /// inserted. Zero when the transaction lost its race.
    pub async fn record_post(&self, args: RunnerResponse) -> Result<usize> {
        let now = Utc::now();
        let result_id = ResourceId::new();

        let mut ops = vec![
            Op::UpdateWork {
                id: args.key,
                assert: WorkAssert {
                    status: WorkStatus::Processing,
                    attempt_head: Some(args.attempt_id),
                    rev: args.work_rev,
                },
                set_status: WorkStatus::Completed,
                push_attempt: None,
            },
            Op::InsertWorkResult(WorkResult {
                id: result_id,
                work_id: args.key,
                success: true,
                revision: args.revision.clone(),
                revision_date: args.revision_date,
                completed_at: now,
                error: None,
            }),
        ];

        // Classify every sub-test before touching the store: an unknown
        // kind aborts the whole commit with zero rows written.
        let mut notifications = Vec::new();
        for out in &args.tests {
            let status = classify(out)?;
            let test_id = ResourceId::new();
            ops.push(Op::InsertTestResult(TestResult {
                id: test_id,
                work_result_id: result_id,
                import_path: out.import_path.clone(),
                revision: args.revision.clone(),
                revision_date: args.revision_date,
                recorded_at: now,
                output: out.output.clone(),
                status,
            }));

            if out.config.is_empty() {
                continue;
            }
            notifications.push(Notification {
                id: ResourceId::new(),
                test_id,
                config: out.config.clone(),
                status: NotifStatus::Waiting,
            });
        }

        let triggered = notifications.len();
        ops.extend(notifications.into_iter().map(Op::InsertNotification));

        match self.state.store.run(ops).await {
            Ok(()) => Ok(triggered),
            Err(StoreError::Aborted) => {
                debug!(work = %args.key, attempt = %args.attempt_id, "lost the race inserting result");
                Ok(0)
            }
            Err(e) => Err(Error::Internal(e.to_string())),
        }
    }

    /// Record a build error: the attempt completed without any test running.
    pub async fn error(&self, args: BuilderResponse) -> Result<()> {
        let ops = vec![
            Op::UpdateWork {
                id: args.key,
                assert: WorkAssert {
                    status: WorkStatus::Processing,
                    attempt_head: Some(args.attempt_id),
                    rev: args.work_rev,
                },
                set_status: WorkStatus::Completed,
                push_attempt: None,
            },
            Op::InsertWorkResult(WorkResult {
                id: ResourceId::new(),
                work_id: args.key,
                success: false,
                revision: args.revision.clone(),
                revision_date: args.revision_date,
                completed_at: Utc::now(),
                error: Some(args.error),
            }),
        ];

        match self.state.store.run(ops).await {
            Ok(()) => Ok(()),
            Err(StoreError::Aborted) => {
                debug!(work = %args.key, attempt = %args.attempt_id, "lost the race inserting result");
                Ok(())
            }
            Err(e) => Err(Error::Internal(e.to_string())),
        }
    }

    /// Record that the dispatcher gave up on an item. No attempt-id
    /// assertion: the attempt entry may already be gone.
    pub async fn dispatch_error(&self, args: DispatchResponse) -> Result<()> {
        let ops = vec![
            Op::UpdateWork {
                id: args.key,
                assert: WorkAssert {
                    status: WorkStatus::Processing,
                    attempt_head: None,
                    rev: args.work_rev,
                },
                set_status: WorkStatus::Completed,
                push_attempt: None,
            },
            Op::InsertWorkResult(WorkResult {
                id: ResourceId::new(),
                work_id: args.key,
                success: false,
                revision: String::new(),
                revision_date: None,
                completed_at: Utc::now(),
                error: Some(args.error),
            }),
        ];

        match self.state.store.run(ops).await {
            Ok(()) => Ok(()),
            Err(StoreError::Aborted) => {
                debug!(work = %args.key, "lost the race inserting result");
                Ok(())
            }
            Err(e) => Err(Error::Internal(e.to_string())),
        }
    }

    /// Fire the notification dispatch signal. Best effort: failures are
    /// logged and never surfaced.
    fn trigger_dispatch(&self) {
        let url = format!("{}/notifications/dispatch", self.state.base_url);
        let http = self.state.http.clone();
        tokio::spawn(async move {
            if let Err(e) = http.get(&url).send().await {
                warn!(error = %e, "notification dispatch trigger failed");
            }
        });
    }
}

/// Classify one reported sub-test output.
fn classify(out: &TestOutput) -> Result<TestStatus> {
    match out.kind.as_str() {
        OUTPUT_SUCCESS => {
            if out.output.ends_with(PASS_MARKER) {
                Ok(TestStatus::Pass)
            } else {
                Ok(TestStatus::Fail)
            }
        }
        OUTPUT_WONT_BUILD => Ok(TestStatus::WontBuild),
        OUTPUT_ERROR => Ok(TestStatus::Error),
        other => Err(Error::InvalidInput(format!("unknown output kind: {other}"))),
    }
}
