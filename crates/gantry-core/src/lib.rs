//! Core domain types for the Gantry CI dispatch system.
//!
//! This crate contains:
//! - Resource identifiers and the shared error type
//! - Work items, attempt logs, and work descriptors
//! - Work/test results and their classification statuses
//! - Notification records and trigger configuration
//! - Worker (builder/runner) registration records

pub mod error;
pub mod id;
pub mod notify;
pub mod result;
pub mod work;
pub mod worker;

pub use error::{Error, Result};
pub use id::ResourceId;
pub use notify::{NotifStatus, Notification, TriggerConfig};
pub use result::{TestResult, TestStatus, WorkResult};
pub use work::{AttemptEntry, Vcs, WorkItem, WorkSpec, WorkStatus};
pub use worker::{WorkerKind, WorkerRecord};
