//! HTTP scheduler client backend.
//!
//! Speaks a run/stop/describe/list-by-tag JSON API exposed by a managed
//! container scheduler. The cluster and task template come from
//! configuration; each task is tagged with its session id so it can be
//! recovered without a separate index.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::TaskBackend;
use crate::task::{TaskError, TaskInfo, TaskStatus};

/// Session tag key applied to every task.
const SESSION_TAG: &str = "browsergrid:session-id";

/// Configuration for the scheduler client.
#[derive(Debug, Clone)]
pub struct HttpSchedulerConfig {
    /// Base URL of the scheduler API, e.g. `https://scheduler.internal:8443`.
    pub base_url: String,
    /// Cluster to place tasks on.
    pub cluster: String,
    /// Task template (definition) identifier.
    pub task_template: String,
}

#[derive(Debug, Serialize)]
struct RunTaskRequest<'a> {
    cluster: &'a str,
    task_template: &'a str,
    tags: HashMap<&'a str, &'a str>,
    env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct StopTaskRequest<'a> {
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct TaskDescription {
    task_id: String,
    handle: String,
    status: TaskStatus,
    #[serde(default)]
    private_address: Option<String>,
    #[serde(default)]
    public_address: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TaskList {
    tasks: Vec<TaskDescription>,
}

#[derive(Debug, Deserialize)]
struct SchedulerError {
    #[serde(default)]
    message: String,
}

impl TaskDescription {
    fn into_info(self) -> TaskInfo {
        let session_id = self.tags.get(SESSION_TAG).cloned().unwrap_or_default();
        TaskInfo {
            task_id: self.task_id,
            handle: self.handle,
            status: self.status,
            private_address: self.private_address,
            public_address: self.public_address,
            session_id,
        }
    }
}

/// Managed container scheduler backend.
pub struct HttpSchedulerBackend {
    config: HttpSchedulerConfig,
    client: reqwest::Client,
}

impl HttpSchedulerBackend {
    pub fn new(config: HttpSchedulerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn error_body(response: reqwest::Response) -> String {
        response
            .json::<SchedulerError>()
            .await
            .map(|e| e.message)
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskBackend for HttpSchedulerBackend {
    async fn start_task(
        &self,
        session_id: &str,
        env: HashMap<String, String>,
    ) -> Result<String, TaskError> {
        let request = RunTaskRequest {
            cluster: &self.config.cluster,
            task_template: &self.config.task_template,
            tags: HashMap::from([(SESSION_TAG, session_id)]),
            env,
        };

        let response = self
            .client
            .post(self.url("/v1/tasks"))
            .json(&request)
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let description: TaskDescription = response
                    .json()
                    .await
                    .map_err(|e| TaskError::Transport(e.to_string()))?;
                info!(session_id, handle = %description.handle, "scheduler accepted task");
                Ok(description.handle)
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                Err(TaskError::CapacityExceeded(Self::error_body(response).await))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(TaskError::InvalidTemplate(Self::error_body(response).await))
            }
            status => Err(TaskError::Transport(format!(
                "scheduler returned {status}: {}",
                Self::error_body(response).await
            ))),
        }
    }

    async fn stop_task(&self, handle: &str, reason: &str) -> Result<(), TaskError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/tasks/{handle}/stop")))
            .json(&StopTaskRequest { reason })
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Stop is best-effort; a task the scheduler no longer knows
            // about already satisfies the request.
            StatusCode::NOT_FOUND => {
                debug!(handle, "stop requested for unknown task");
                Ok(())
            }
            status => {
                warn!(handle, %status, "scheduler stop failed");
                Err(TaskError::Transport(format!(
                    "scheduler returned {status}: {}",
                    Self::error_body(response).await
                )))
            }
        }
    }

    async fn find_task_by_session(&self, session_id: &str) -> Result<Option<String>, TaskError> {
        let response = self
            .client
            .get(self.url("/v1/tasks"))
            .query(&[("tag", format!("{SESSION_TAG}={session_id}"))])
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TaskError::Transport(format!(
                "scheduler returned {}: {}",
                response.status(),
                Self::error_body(response).await
            )));
        }

        let list: TaskList = response
            .json()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        Ok(list
            .tasks
            .into_iter()
            .find(|t| matches!(t.status, TaskStatus::Starting | TaskStatus::Running))
            .map(|t| t.handle))
    }

    async fn task_info(&self, handle: &str) -> Result<Option<TaskInfo>, TaskError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/tasks/{handle}")))
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let description: TaskDescription = response
                    .json()
                    .await
                    .map_err(|e| TaskError::Transport(e.to_string()))?;
                Ok(Some(description.into_info()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(TaskError::Transport(format!(
                "scheduler returned {status}: {}",
                Self::error_body(response).await
            ))),
        }
    }
}
