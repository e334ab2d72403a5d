//! Task model and errors.

use serde::{Deserialize, Serialize};

use browsergrid_core::Error;

/// Scheduler-reported task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Unknown,
}

/// Description of one backing container task.
///
/// Tasks are owned exclusively by the task backend; the session
/// orchestrator requests actions on them but never mutates task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    /// Opaque scheduler-specific reference (e.g. an ARN).
    pub handle: String,
    pub status: TaskStatus,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    /// Session tag used to recover the task without a separate index.
    pub session_id: String,
}

impl TaskInfo {
    /// First usable address: public preferred, private as fallback for
    /// intra-network callers.
    pub fn address(&self) -> Option<&str> {
        self.public_address
            .as_deref()
            .or(self.private_address.as_deref())
    }
}

/// Task backend error.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Scheduler capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid task template: {0}")]
    InvalidTemplate(String),

    #[error("Endpoint not resolved within {0:?}")]
    ResolveTimeout(std::time::Duration),

    #[error("Scheduler transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TaskError> for Error {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(handle) => Error::NotFound(format!("task {handle}")),
            TaskError::CapacityExceeded(msg) => Error::CapacityExceeded(msg),
            TaskError::ResolveTimeout(d) => Error::Timeout(d),
            other => Error::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_prefers_public() {
        let mut info = TaskInfo {
            task_id: "t1".into(),
            handle: "h1".into(),
            status: TaskStatus::Running,
            private_address: Some("10.0.0.5".into()),
            public_address: Some("203.0.113.7".into()),
            session_id: "s1".into(),
        };
        assert_eq!(info.address(), Some("203.0.113.7"));

        info.public_address = None;
        assert_eq!(info.address(), Some("10.0.0.5"));

        info.private_address = None;
        assert_eq!(info.address(), None);
    }
}
