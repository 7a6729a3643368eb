//! Gantry hub server.

use std::sync::Arc;

use gantry_api::services::{ResponseService, TrackerService};
use gantry_api::{AppState, HubConfig, dispatch::Dispatcher, routes};
use gantry_store::{MemoryStore, PgStore, Store, create_pool, run_migrations};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HubConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            info!("connecting to database");
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            info!("no DATABASE_URL set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.base_url.clone(), config.attempt_timeout);

    let dispatcher = Dispatcher::new(
        TrackerService::new(state.clone()),
        ResponseService::new(state.clone()),
        config.dispatch_interval,
        config.dispatch_retries,
    );
    tokio::spawn(dispatcher.run());

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!(bind = %config.bind, "starting hub");
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
