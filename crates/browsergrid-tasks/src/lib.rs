//! # Browsergrid Tasks
//!
//! Lifecycle management for the container tasks that back browser sessions.
//!
//! Every real operation (start, stop, locate, resolve) is scheduler-specific,
//! but the [`TaskBackend`] contract is stable: the session orchestrator
//! depends only on the contract, so the same control-plane logic runs against
//! a managed container scheduler in production ([`HttpSchedulerBackend`]) or
//! a local process supervisor in development ([`LocalProcessBackend`]).

mod backend;
mod http;
mod local;
mod task;

pub use backend::TaskBackend;
pub use http::{HttpSchedulerBackend, HttpSchedulerConfig};
pub use local::{LocalBackendConfig, LocalProcessBackend};
pub use task::{TaskError, TaskInfo, TaskStatus};
