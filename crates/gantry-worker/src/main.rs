//! Gantry builder server.

use std::sync::Arc;

use gantry_core::{ResourceId, WorkerKind};
use gantry_rpc::Client;
use gantry_rpc::wire::{Announce, AnnounceReply, WorkerKey};
use gantry_worker::{
    ActiveRegistry, CommandBuilder, LocalProcessManager, Reporter, RunScheduler, TaskQueue,
    WorkerConfig, routes, run_worker,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::from_env()?;

    let queue = TaskQueue::new();
    let (registry, done) = ActiveRegistry::new();
    let scheduler = RunScheduler::new(
        Arc::new(LocalProcessManager::new()),
        registry.clone(),
        config.base_url.clone(),
        config.deadline,
        config.process_control,
    );
    let builder = Arc::new(CommandBuilder::new(config.build_command.clone()));

    let tracker = Client::new(format!(
        "{}/rpc/tracker",
        config.hub_url.trim_end_matches('/')
    ));
    let mut keys = vec![announce(&tracker, WorkerKind::Builder, &config.base_url).await?];
    if config.announce_runner {
        keys.push(announce(&tracker, WorkerKind::Runner, &config.base_url).await?);
    }
    tokio::spawn(heartbeat(tracker, keys, config.ping_interval));

    tokio::spawn(run_worker(queue.clone(), registry.clone(), scheduler, builder));
    tokio::spawn(Reporter::new(&config.hub_url).run(done));

    let app = routes::router(registry, queue).layer(TraceLayer::new_for_http());

    info!(bind = %config.bind, "starting builder");
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn announce(tracker: &Client, kind: WorkerKind, url: &str) -> anyhow::Result<ResourceId> {
    let args = Announce {
        kind,
        url: url.to_string(),
    };
    let reply: AnnounceReply = tracker.call("Tracker.Announce", &args).await?;
    info!(?kind, key = %reply.key, "announced to hub");
    Ok(reply.key)
}

/// Keep the hub's liveness records fresh. A failed ping is logged and
/// retried on the next tick.
async fn heartbeat(tracker: Client, keys: Vec<ResourceId>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for key in &keys {
            let args = WorkerKey { key: *key };
            if let Err(e) = tracker.call::<_, ()>("Tracker.Ping", &args).await {
                warn!(key = %key, error = %e, "ping failed");
            }
        }
    }
}
