//! Session orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use browsergrid_auth::{ConnectClaims, CredentialService};
use browsergrid_bus::{ready_channel, CoordinationBus, ReadyNotification};
use browsergrid_core::{
    metadata::detail, CreateSessionOptions, Error, MetadataMap, Session, SessionEventKind,
    SessionStatus,
};
use browsergrid_store::{SessionRecord, SessionStore};
use browsergrid_tasks::TaskBackend;

use crate::waiter::{StateWaiter, WaitCheck};

/// Event source tag for entries written by this component.
const SOURCE: &str = "orchestrator";

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Storage TTL applied to session records; `None` disables expiry.
    pub record_ttl: Option<Duration>,
    /// Budget for endpoint resolution after a task starts.
    pub resolve_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            record_ttl: Some(Duration::from_secs(86_400)),
            resolve_timeout: Duration::from_secs(120),
        }
    }
}

/// Creates, drives, and retires browser sessions.
///
/// All methods are safe to call concurrently for different session ids.
/// Transitions on one session serialize through a read-modify-write of the
/// full record; the store's last write wins, which is acceptable because
/// each transition has a single logical owner at a time.
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn CoordinationBus>,
    tasks: Arc<dyn TaskBackend>,
    credentials: Arc<CredentialService>,
    waiter: StateWaiter,
    config: OrchestratorConfig,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn CoordinationBus>,
        tasks: Arc<dyn TaskBackend>,
        credentials: Arc<CredentialService>,
        config: OrchestratorConfig,
    ) -> Self {
        let waiter = StateWaiter::new(store.clone(), bus.clone());
        Self {
            store,
            bus,
            tasks,
            credentials,
            waiter,
            config,
        }
    }

    async fn load(&self, session_id: &str) -> Result<Session, Error> {
        self.store
            .get(session_id)
            .await
            .map_err(Error::from)?
            .map(|record| record.session)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    async fn persist(&self, session: &Session) -> Result<(), Error> {
        let record = SessionRecord::with_ttl(session.clone(), self.config.record_ttl);
        self.store.put(&record).await.map_err(Error::from)
    }

    /// Create a session record for `project_id` in `CREATING`.
    ///
    /// Returns immediately; the backing task is requested separately via
    /// [`request_provisioning`](Self::request_provisioning).
    pub async fn create_session(
        &self,
        project_id: &str,
        options: CreateSessionOptions,
    ) -> Result<Session, Error> {
        let session = Session::new(project_id, options);
        self.persist(&session).await?;
        info!(session_id = %session.id, project_id, "session created");
        Ok(session)
    }

    /// Request a container task for the session.
    ///
    /// On scheduler failure the session transitions to `FAILED` with the
    /// failure detail in its event history; that transition is terminal
    /// and not retried automatically. Re-requesting provisioning for a
    /// session already in flight (no live task yet) bumps `retry_count`.
    pub async fn request_provisioning(&self, session_id: &str) -> Result<Session, Error> {
        let mut session = self.load(session_id).await?;

        if session.task_handle.is_some() {
            return Err(Error::Conflict(format!(
                "session {session_id} already has a live task"
            )));
        }
        // A task may survive an orchestrator restart; never start a second
        // one for the same session.
        if let Some(handle) = self.tasks.find_task_by_session(session_id).await? {
            return Err(Error::Conflict(format!(
                "session {session_id} already backed by task {handle}"
            )));
        }

        match session.status {
            SessionStatus::Creating => {
                session.transition(SessionStatus::Provisioning, SOURCE, MetadataMap::new())?;
            }
            SessionStatus::Provisioning => {
                // Caller retry of an in-flight provisioning attempt.
                session.retry_count += 1;
            }
            other => {
                return Err(Error::InvalidTransition {
                    from: other.to_string(),
                    to: SessionStatus::Provisioning.to_string(),
                });
            }
        }
        self.persist(&session).await?;

        let env = HashMap::from([
            ("BROWSERGRID_PROJECT_ID".to_string(), session.project_id.clone()),
            (
                "BROWSERGRID_SESSION_TIMEOUT_SECS".to_string(),
                session.resource_limits.timeout_secs.to_string(),
            ),
        ]);

        match self.tasks.start_task(session_id, env).await {
            Ok(handle) => {
                session.task_handle = Some(handle.clone());
                session.append_event(
                    SessionEventKind::TaskStarted,
                    SOURCE,
                    detail([("task_handle", handle.as_str())]),
                );
                session.transition(SessionStatus::Starting, SOURCE, MetadataMap::new())?;
                self.persist(&session).await?;
                info!(session_id, handle, "task requested");
                Ok(session)
            }
            Err(err) => {
                let failure = err.to_string();
                session.transition(
                    SessionStatus::Failed,
                    SOURCE,
                    detail([("error", failure.as_str())]),
                )?;
                self.persist(&session).await?;
                warn!(session_id, error = %failure, "provisioning failed");
                Err(err.into())
            }
        }
    }

    /// Record the task's resolved address, mint a connect URL, and wake
    /// readiness waiters. The only path that unblocks them.
    pub async fn mark_ready(&self, session_id: &str, address: &str) -> Result<Session, Error> {
        let mut session = self.load(session_id).await?;

        let token = self
            .credentials
            .sign(ConnectClaims::new(&session.id, &session.project_id))
            .await?;
        let connect_url = self.credentials.build_connect_url(address, &token)?;

        session.network_address = Some(address.to_string());
        session.connect_url = Some(connect_url.to_string());
        session.transition(
            SessionStatus::Ready,
            SOURCE,
            detail([("address", address)]),
        )?;
        self.persist(&session).await?;

        // Best-effort wake; waiters that miss it fall back to the store.
        let notification = ReadyNotification {
            session_id: session.id.clone(),
            status: session.status.to_string(),
        };
        if let Err(err) = self
            .bus
            .publish(&ready_channel(&session.id), &notification)
            .await
        {
            warn!(session_id, error = %err, "ready notification publish failed");
        }

        info!(session_id, address, "session ready");
        Ok(session)
    }

    /// Resolve the endpoint of the session's task and mark it ready.
    ///
    /// Convenience composition for drivers that own both steps; polls the
    /// scheduler within the configured resolve budget.
    pub async fn resolve_and_mark_ready(&self, session_id: &str) -> Result<Session, Error> {
        let session = self.load(session_id).await?;
        let handle = session
            .task_handle
            .ok_or_else(|| Error::Conflict(format!("session {session_id} has no task")))?;

        let address = self
            .tasks
            .resolve_endpoint(&handle, self.config.resolve_timeout)
            .await?;
        self.mark_ready(session_id, &address).await
    }

    /// Block until the session is usable, fails, times out, or the caller
    /// cancels — whichever happens first.
    pub async fn wait_until_ready(
        &self,
        session_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Session, Error> {
        self.waiter
            .wait_until(
                session_id,
                &ready_channel(session_id),
                timeout,
                cancel,
                |session| {
                    if session.status == SessionStatus::Failed {
                        return WaitCheck::Fail(Error::SessionFailed(session.id.clone()));
                    }
                    if session.status.is_usable()
                        && session
                            .network_address
                            .as_deref()
                            .is_some_and(|a| !a.is_empty())
                    {
                        return WaitCheck::Done;
                    }
                    WaitCheck::Pending
                },
            )
            .await
    }

    /// Stop the session's task and retire the record.
    ///
    /// The store transitions happen regardless of whether the scheduler
    /// confirms the stop: the scheduler is best-effort cleanup, not the
    /// authority on session state. A stop failure is recorded in the
    /// event history.
    pub async fn terminate(&self, session_id: &str, reason: &str) -> Result<Session, Error> {
        let mut session = self.load(session_id).await?;

        session.transition(
            SessionStatus::Terminating,
            SOURCE,
            detail([("reason", reason)]),
        )?;
        self.persist(&session).await?;

        if let Some(handle) = session.task_handle.take() {
            if let Err(err) = self.tasks.stop_task(&handle, reason).await {
                warn!(session_id, handle, error = %err, "task stop failed");
                session.append_event(
                    SessionEventKind::TaskStopFailed,
                    SOURCE,
                    detail([("task_handle", handle.clone()), ("error", err.to_string())]),
                );
            }
        }

        session.transition(SessionStatus::Stopped, SOURCE, MetadataMap::new())?;
        let duration_ms = session
            .duration()
            .map(|d| d.num_milliseconds())
            .unwrap_or_default();
        session.append_event(
            SessionEventKind::Terminated,
            SOURCE,
            detail([
                ("reason", reason.to_string()),
                ("duration_ms", duration_ms.to_string()),
            ]),
        );
        self.persist(&session).await?;

        info!(session_id, reason, duration_ms, "session terminated");
        Ok(session)
    }

    /// Fetch a session by id.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, Error> {
        self.load(session_id).await
    }

    /// All of a project's sessions, newest first.
    pub async fn list_sessions_by_project(&self, project_id: &str) -> Result<Vec<Session>, Error> {
        let records = self
            .store
            .query_by_project(project_id)
            .await
            .map_err(Error::from)?;
        Ok(records.into_iter().map(|r| r.session).collect())
    }

    /// Mark a ready session active on first client contact; refreshes
    /// `updated_at` on subsequent calls.
    pub async fn touch_session(&self, session_id: &str) -> Result<Session, Error> {
        let mut session = self.load(session_id).await?;
        match session.status {
            SessionStatus::Ready => {
                session.transition(SessionStatus::Active, SOURCE, MetadataMap::new())?;
            }
            SessionStatus::Active => {
                session.updated_at = chrono::Utc::now();
            }
            other => {
                return Err(Error::Conflict(format!(
                    "session {session_id} is {other}, not usable"
                )));
            }
        }
        self.persist(&session).await?;
        Ok(session)
    }

    /// Issue a fresh connect token for a usable session, recomputing its
    /// connect URL.
    pub async fn issue_connect_url(
        &self,
        session_id: &str,
        user_id: Option<String>,
        client_ip: Option<String>,
    ) -> Result<Session, Error> {
        let mut session = self.load(session_id).await?;
        if !session.status.is_usable() {
            return Err(Error::Conflict(format!(
                "session {session_id} is {}, not usable",
                session.status
            )));
        }
        let address = session
            .network_address
            .clone()
            .ok_or_else(|| Error::Conflict(format!("session {session_id} has no address")))?;

        let mut claims = ConnectClaims::new(&session.id, &session.project_id);
        claims.user_id = user_id;
        claims.client_ip = client_ip;
        let token = self.credentials.sign(claims).await?;
        let url = self.credentials.build_connect_url(&address, &token)?;

        session.connect_url = Some(url.to_string());
        session.updated_at = chrono::Utc::now();
        self.persist(&session).await?;
        Ok(session)
    }

    /// Re-adopt a task that survived an orchestrator restart.
    ///
    /// Looks the task up by its session tag and records the handle if the
    /// session record lost it.
    pub async fn recover_session(&self, session_id: &str) -> Result<Option<String>, Error> {
        let mut session = self.load(session_id).await?;
        if session.task_handle.is_some() || session.status.is_terminal() {
            return Ok(session.task_handle);
        }

        let Some(handle) = self.tasks.find_task_by_session(session_id).await? else {
            return Ok(None);
        };

        session.task_handle = Some(handle.clone());
        session.append_event(
            SessionEventKind::TaskStarted,
            SOURCE,
            detail([("task_handle", handle.as_str()), ("recovered", "true")]),
        );
        self.persist(&session).await?;
        info!(session_id, handle, "re-adopted task after restart");
        Ok(Some(handle))
    }
}
