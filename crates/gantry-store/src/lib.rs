//! Durable store for Gantry.
//!
//! Every mutation of a work item and its descendants goes through
//! [`Store::run`], a multi-document conditional transaction: either every
//! assertion holds and every write applies, or nothing is written at all.
//! That contract is what lets many dispatchers race without distributed
//! locks.
//!
//! Two implementations: [`MemoryStore`] for tests and single-process use,
//! and [`PgStore`], a compare-and-swap over versioned rows in PostgreSQL.

pub mod error;
pub mod memory;
pub mod ops;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use ops::{Op, WorkAssert};
pub use postgres::PgStore;
pub use store::Store;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}
