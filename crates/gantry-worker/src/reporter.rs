//! Forwards completed attempts to the hub's `Response` service.

use gantry_rpc::Client;
use gantry_rpc::wire::{BuilderResponse, OUTPUT_SUCCESS, RunnerResponse, TestOutput};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::registry::{ActiveTest, AttemptState};

pub struct Reporter {
    client: Client,
}

impl Reporter {
    /// A reporter talking to the hub at `hub_url`.
    pub fn new(hub_url: &str) -> Self {
        let url = format!("{}/rpc/response", hub_url.trim_end_matches('/'));
        Self {
            client: Client::new(url),
        }
    }

    /// Consume completion events until the registry is dropped. RPC
    /// failures are logged only; the hub re-leases the attempt once it
    /// times out.
    pub async fn run(self, mut done: mpsc::UnboundedReceiver<ActiveTest>) {
        while let Some(test) = done.recv().await {
            self.report(test).await;
        }
        info!("completion channel closed, reporter done");
    }

    async fn report(&self, test: ActiveTest) {
        let work = &test.work;
        let result = match test.state {
            AttemptState::Finished => {
                let args = RunnerResponse {
                    key: work.work_id,
                    attempt_id: work.attempt_id,
                    work_rev: work.work_rev,
                    revision: work.spec.revision.clone(),
                    revision_date: Some(work.spec.revision_date),
                    tests: vec![TestOutput {
                        kind: OUTPUT_SUCCESS.to_string(),
                        import_path: work.spec.import_path.clone(),
                        output: test.output.clone(),
                        config: test.config.clone(),
                    }],
                };
                self.client.call::<_, ()>("Response.Post", &args).await
            }
            AttemptState::Errored | AttemptState::TimedOut => {
                let args = BuilderResponse {
                    key: work.work_id,
                    attempt_id: work.attempt_id,
                    work_rev: work.work_rev,
                    revision: work.spec.revision.clone(),
                    revision_date: Some(work.spec.revision_date),
                    error: test.error.clone().unwrap_or_else(|| "unknown".to_string()),
                };
                self.client.call::<_, ()>("Response.Error", &args).await
            }
            state => {
                warn!(attempt = %work.attempt_id, ?state, "completion event for a live state");
                return;
            }
        };

        match result {
            Ok(()) => info!(attempt = %work.attempt_id, state = ?test.state, "reported"),
            Err(e) => warn!(attempt = %work.attempt_id, error = %e, "report failed"),
        }
    }
}
