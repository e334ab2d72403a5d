//! Local process supervisor backend.
//!
//! Runs one browser process per session on the local machine. Used by
//! development deployments and tests; satisfies the same [`TaskBackend`]
//! contract as the production scheduler client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::TaskBackend;
use crate::task::{TaskError, TaskInfo, TaskStatus};

/// Configuration for the local process backend.
#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// Program to launch per task (e.g. a headless-browser wrapper script).
    pub command: String,
    /// Fixed arguments passed before the generated ones.
    pub args: Vec<String>,
    /// First CDP port handed out to spawned tasks.
    pub port_start: u16,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            command: "chromium".to_string(),
            args: vec!["--headless".to_string()],
            port_start: 9300,
        }
    }
}

struct LocalTask {
    task_id: String,
    session_id: String,
    port: u16,
    child: Arc<Mutex<Child>>,
}

/// Local process supervisor. Tracks spawned children by handle; a task is
/// "running" while its child process is alive.
pub struct LocalProcessBackend {
    config: LocalBackendConfig,
    tasks: DashMap<String, LocalTask>,
    next_port: AtomicU16,
}

impl LocalProcessBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        let next_port = AtomicU16::new(config.port_start);
        Self {
            config,
            tasks: DashMap::new(),
            next_port,
        }
    }

    async fn child_status(child: &Arc<Mutex<Child>>) -> TaskStatus {
        match child.lock().await.try_wait() {
            Ok(Some(_)) => TaskStatus::Stopped,
            Ok(None) => TaskStatus::Running,
            Err(_) => TaskStatus::Unknown,
        }
    }
}

#[async_trait]
impl TaskBackend for LocalProcessBackend {
    async fn start_task(
        &self,
        session_id: &str,
        env: HashMap<String, String>,
    ) -> Result<String, TaskError> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let task_id = Uuid::new_v4().simple().to_string();
        let handle = format!("local:{task_id}");

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg(format!("--remote-debugging-port={port}"))
            .envs(env)
            .env("BROWSERGRID_SESSION_ID", session_id)
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            TaskError::InvalidTemplate(format!(
                "failed to spawn '{}': {e}",
                self.config.command
            ))
        })?;

        info!(session_id, handle, port, "spawned local browser task");
        self.tasks.insert(
            handle.clone(),
            LocalTask {
                task_id,
                session_id: session_id.to_string(),
                port,
                child: Arc::new(Mutex::new(child)),
            },
        );
        Ok(handle)
    }

    async fn stop_task(&self, handle: &str, reason: &str) -> Result<(), TaskError> {
        let Some(task) = self.tasks.get(handle) else {
            debug!(handle, "stop requested for unknown local task");
            return Ok(());
        };

        let child = task.child.clone();
        drop(task);

        let mut child = child.lock().await;
        if let Err(e) = child.start_kill() {
            // Already exited counts as stopped.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                warn!(handle, error = %e, "failed to kill local task");
            }
        }
        let _ = child.wait().await;
        info!(handle, reason, "stopped local browser task");
        Ok(())
    }

    async fn find_task_by_session(&self, session_id: &str) -> Result<Option<String>, TaskError> {
        // Snapshot handles before awaiting; dashmap guards must not be
        // held across suspension points.
        let candidates: Vec<(String, Arc<Mutex<Child>>)> = self
            .tasks
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| (entry.key().clone(), entry.child.clone()))
            .collect();

        for (handle, child) in candidates {
            if Self::child_status(&child).await == TaskStatus::Running {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    async fn task_info(&self, handle: &str) -> Result<Option<TaskInfo>, TaskError> {
        let Some((task_id, session_id, port, child)) = self.tasks.get(handle).map(|task| {
            (
                task.task_id.clone(),
                task.session_id.clone(),
                task.port,
                task.child.clone(),
            )
        }) else {
            return Ok(None);
        };

        let status = Self::child_status(&child).await;
        Ok(Some(TaskInfo {
            task_id,
            handle: handle.to_string(),
            status,
            private_address: Some(format!("127.0.0.1:{port}")),
            public_address: None,
            session_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleep_backend() -> LocalProcessBackend {
        LocalProcessBackend::new(LocalBackendConfig {
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            port_start: 9400,
        })
    }

    #[tokio::test]
    async fn test_start_find_stop() {
        let backend = sleep_backend();
        let handle = backend.start_task("s1", HashMap::new()).await.unwrap();

        let found = backend.find_task_by_session("s1").await.unwrap();
        assert_eq!(found.as_deref(), Some(handle.as_str()));
        assert!(backend.find_task_by_session("other").await.unwrap().is_none());

        backend.stop_task(&handle, "test done").await.unwrap();
        let info = backend.task_info(&handle).await.unwrap().unwrap();
        assert_eq!(info.status, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_unknown_task_is_ok() {
        let backend = sleep_backend();
        backend.stop_task("local:missing", "noop").await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_endpoint_returns_local_address() {
        let backend = sleep_backend();
        let handle = backend.start_task("s1", HashMap::new()).await.unwrap();

        let address = backend
            .resolve_endpoint(&handle, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(address.starts_with("127.0.0.1:"));

        backend.stop_task(&handle, "cleanup").await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_is_invalid_template() {
        let backend = LocalProcessBackend::new(LocalBackendConfig {
            command: "definitely-not-a-real-binary".to_string(),
            args: Vec::new(),
            port_start: 9500,
        });
        let err = backend.start_task("s1", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidTemplate(_)));
    }
}
