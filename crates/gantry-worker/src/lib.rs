//! Builder process for Gantry.
//!
//! Receives leased attempts on an in-process task queue, builds the test
//! binary, spawns a runner process per attempt under a deadline, serves the
//! per-attempt callback routes the runner reports through, and forwards
//! completions to the hub's `Response` service.

pub mod builder;
pub mod config;
pub mod procs;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod routes;
pub mod scheduler;

pub use builder::{BuiltTest, CommandBuilder, TestBuilder};
pub use config::WorkerConfig;
pub use procs::{LocalProcessManager, ProcHandle, ProcInfo, ProcessManager};
pub use queue::TaskQueue;
pub use registry::{ActiveRegistry, ActiveTest, AttemptState};
pub use reporter::Reporter;
pub use scheduler::RunScheduler;

use gantry_rpc::wire::LeasedWork;
use std::sync::Arc;
use tracing::{error, info};

/// Pop leased work, build it, register the attempt, and hand it to the run
/// scheduler. Runs until the queue shuts down.
pub async fn run_worker(
    queue: TaskQueue,
    registry: ActiveRegistry,
    scheduler: RunScheduler,
    builder: Arc<dyn TestBuilder>,
) {
    while let Some(work) = queue.pop().await {
        process_one(&registry, &scheduler, builder.as_ref(), work).await;
    }
    info!("task queue closed, worker loop done");
}

async fn process_one(
    registry: &ActiveRegistry,
    scheduler: &RunScheduler,
    builder: &dyn TestBuilder,
    work: LeasedWork,
) {
    let attempt_id = work.attempt_id;
    info!(work = %work.work_id, attempt = %attempt_id, path = %work.spec.import_path, "processing leased work");

    match builder.build(&work.spec).await {
        Ok(built) => {
            registry.insert(ActiveTest::new(work, built.binary_path, built.config));
            scheduler.schedule(attempt_id).await;
        }
        Err(e) => {
            error!(attempt = %attempt_id, error = %e, "build failed");
            // Register and immediately fail so the completion flows through
            // the one reporting path.
            registry.insert(ActiveTest::new(work, Default::default(), Default::default()));
            registry.fail(attempt_id, format!("build failed: {e}"), false);
        }
    }
}
