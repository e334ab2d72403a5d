//! Backend-agnostic task lifecycle contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::task::{TaskError, TaskInfo, TaskStatus};

/// Poll interval used when resolving an endpoint.
pub(crate) const RESOLVE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Task lifecycle operations a scheduler backend must provide.
///
/// Callers that need start-idempotency check [`find_task_by_session`]
/// before calling [`start_task`]; the backend itself does not deduplicate.
///
/// [`find_task_by_session`]: TaskBackend::find_task_by_session
/// [`start_task`]: TaskBackend::start_task
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Start one task tagged with `session_id`, returning its handle.
    async fn start_task(
        &self,
        session_id: &str,
        env: HashMap<String, String>,
    ) -> Result<String, TaskError>;

    /// Stop a task. Best-effort: a missing or already-stopped task is Ok.
    async fn stop_task(&self, handle: &str, reason: &str) -> Result<(), TaskError>;

    /// Locate the running task tagged with `session_id`, if any. Used to
    /// recover task handles after an orchestrator restart.
    async fn find_task_by_session(&self, session_id: &str) -> Result<Option<String>, TaskError>;

    /// Describe a task. Returns `None` when the scheduler no longer knows
    /// the handle.
    async fn task_info(&self, handle: &str) -> Result<Option<TaskInfo>, TaskError>;

    /// Poll until the task reports `Running` with a network attachment, or
    /// `timeout` elapses. First poll is immediate, then every 5 seconds;
    /// the last poll lands exactly on the deadline.
    async fn resolve_endpoint(&self, handle: &str, timeout: Duration) -> Result<String, TaskError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.task_info(handle).await? {
                Some(info) if info.status == TaskStatus::Running => {
                    if let Some(address) = info.address() {
                        return Ok(address.to_string());
                    }
                    debug!(handle, "task running but no network attachment yet");
                }
                Some(info) => {
                    debug!(handle, status = ?info.status, "task not running yet");
                }
                None => return Err(TaskError::NotFound(handle.to_string())),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(TaskError::ResolveTimeout(timeout));
            }
            // Clamp so a budget shorter than the interval still uses the
            // whole budget instead of giving up on the spot.
            tokio::time::sleep_until((now + RESOLVE_POLL_INTERVAL).min(deadline)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    struct SlowStartBackend {
        ready_at: Instant,
    }

    #[async_trait]
    impl TaskBackend for SlowStartBackend {
        async fn start_task(
            &self,
            _session_id: &str,
            _env: HashMap<String, String>,
        ) -> Result<String, TaskError> {
            unimplemented!("not exercised")
        }

        async fn stop_task(&self, _handle: &str, _reason: &str) -> Result<(), TaskError> {
            Ok(())
        }

        async fn find_task_by_session(
            &self,
            _session_id: &str,
        ) -> Result<Option<String>, TaskError> {
            Ok(None)
        }

        async fn task_info(&self, handle: &str) -> Result<Option<TaskInfo>, TaskError> {
            let status = if Instant::now() >= self.ready_at {
                TaskStatus::Running
            } else {
                TaskStatus::Starting
            };
            Ok(Some(TaskInfo {
                task_id: "t1".into(),
                handle: handle.into(),
                status,
                private_address: Some("10.0.0.5".into()),
                public_address: None,
                session_id: "s1".into(),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_uses_whole_budget_shorter_than_interval() {
        let backend = SlowStartBackend {
            ready_at: Instant::now() + Duration::from_secs(1),
        };

        let address = backend
            .resolve_endpoint("h1", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(address, "10.0.0.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_times_out_only_at_the_deadline() {
        let backend = SlowStartBackend {
            ready_at: Instant::now() + Duration::from_secs(60),
        };

        let start = Instant::now();
        let err = backend
            .resolve_endpoint("h1", Duration::from_secs(7))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ResolveTimeout(_)));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }
}
