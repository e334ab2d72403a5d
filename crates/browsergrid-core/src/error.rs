//! Control-plane error taxonomy.

use thiserror::Error;

/// Errors surfaced by the control plane.
///
/// Transport failures from the store, bus, scheduler, and secret store are
/// wrapped in [`Error::Upstream`]; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Session or task does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad, expired, or malformed credential or API key.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflicting request, e.g. a task already exists for the session.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A status transition that the state machine does not permit.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The scheduler cannot start another task.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A readiness wait exceeded its budget.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller cancelled the wait.
    #[error("Cancelled")]
    Cancelled,

    /// The session reached FAILED while a caller was waiting on it.
    #[error("Session failed: {0}")]
    SessionFailed(String),

    /// Store, bus, scheduler, or secret-store transport failure.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Record encoding/decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
