//! Hub process for Gantry.
//!
//! Hosts the `Response` recorder and `Tracker` RPC services, work intake,
//! the dispatcher loop that hands leased attempts to builders, and the
//! notification dispatch trigger.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notifications;
pub mod routes;
pub mod services;
pub mod state;

pub use config::HubConfig;
pub use state::AppState;
