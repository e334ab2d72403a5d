//! Session entity and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::event::{SessionEvent, SessionEventKind};
use crate::metadata::{detail, MetadataMap};

/// Session lifecycle states.
///
/// `Creating`, `Provisioning`, and `Starting` are active-but-not-usable;
/// `Ready` and `Active` are usable; `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Record written, no task requested yet.
    Creating,
    /// Task requested from the scheduler.
    Provisioning,
    /// Task accepted by the scheduler, endpoint not yet resolved.
    Starting,
    /// Task running with a reachable address; connect URL issued.
    Ready,
    /// A client has connected at least once.
    Active,
    /// Stop requested; task teardown in progress.
    Terminating,
    /// Clean shutdown completed.
    Stopped,
    /// Provisioning or runtime failure; never retried in place.
    Failed,
}

impl SessionStatus {
    /// True for sessions with a live or imminent backing task.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Ready | SessionStatus::Active
        )
    }

    /// True for states from which no further transition is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }

    /// True when a client can connect to the session right now.
    pub fn is_usable(self) -> bool {
        matches!(self, SessionStatus::Ready | SessionStatus::Active)
    }

    /// Whether the state machine permits the edge `self -> next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            Creating => matches!(next, Provisioning | Terminating | Failed),
            Provisioning => matches!(next, Starting | Ready | Terminating | Failed),
            Starting => matches!(next, Ready | Terminating | Failed),
            Ready => matches!(next, Active | Terminating | Failed),
            Active => matches!(next, Terminating | Failed),
            Terminating => matches!(next, Stopped | Failed),
            Stopped | Failed => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Creating => "CREATING",
            SessionStatus::Provisioning => "PROVISIONING",
            SessionStatus::Starting => "STARTING",
            SessionStatus::Ready => "READY",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Terminating => "TERMINATING",
            SessionStatus::Stopped => "STOPPED",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Per-session resource limits. Opaque to the control plane; enforced by
/// the scheduler and the browser task itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: f64,
    pub memory_mb: u32,
    /// Hard cap on session lifetime, seconds.
    pub timeout_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory_mb: 2048,
            timeout_secs: 3600,
        }
    }
}

/// Accumulated usage counters, zeroed at creation. Maintained by the
/// excluded billing pipeline; the control plane only initializes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub cpu_seconds: f64,
    pub memory_mb_seconds: f64,
    pub bandwidth_bytes: u64,
}

/// Caller-supplied options for session creation.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    pub resource_limits: Option<ResourceLimits>,
    pub user_metadata: MetadataMap,
    pub model_config: MetadataMap,
}

/// A logical remote-browser instance with a lifecycle independent of its
/// backing compute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, globally unique, immutable.
    pub id: String,
    /// Owning tenant; immutable after creation.
    pub project_id: String,
    pub status: SessionStatus,
    /// Scheduler-specific reference to the backing task, while one is live.
    pub task_handle: Option<String>,
    /// Reachable address of the running task.
    pub network_address: Option<String>,
    /// Signed CDP access URL; recomputed whenever a fresh token is issued.
    pub connect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provisioning_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    /// Provisioning attempts beyond the first; never decremented.
    pub retry_count: u32,
    pub event_history: Vec<SessionEvent>,
    pub resource_limits: ResourceLimits,
    pub billing: BillingInfo,
    pub user_metadata: MetadataMap,
    pub model_config: MetadataMap,
}

impl Session {
    /// Create a new session record in `Creating` for the given project.
    pub fn new(project_id: impl Into<String>, options: CreateSessionOptions) -> Self {
        let now = Utc::now();
        let mut session = Self {
            id: Uuid::new_v4().simple().to_string(),
            project_id: project_id.into(),
            status: SessionStatus::Creating,
            task_handle: None,
            network_address: None,
            connect_url: None,
            created_at: now,
            updated_at: now,
            provisioning_started_at: None,
            ready_at: None,
            last_active_at: None,
            terminated_at: None,
            retry_count: 0,
            event_history: Vec::new(),
            resource_limits: options.resource_limits.unwrap_or_default(),
            billing: BillingInfo::default(),
            user_metadata: options.user_metadata,
            model_config: options.model_config,
        };
        session.append_event(SessionEventKind::Created, "orchestrator", MetadataMap::new());
        session
    }

    /// Apply a status transition, validating it against the state machine.
    ///
    /// Sets the milestone timestamp for the entered state (each at most
    /// once), refreshes `updated_at`, and appends a `StatusChanged` event
    /// carrying `from`/`to` plus the supplied detail.
    pub fn transition(
        &mut self,
        next: SessionStatus,
        source: &str,
        extra: MetadataMap,
    ) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        match next {
            SessionStatus::Provisioning => {
                self.provisioning_started_at.get_or_insert(now);
            }
            SessionStatus::Ready => {
                self.ready_at.get_or_insert(now);
            }
            SessionStatus::Active => {
                self.last_active_at.get_or_insert(now);
            }
            SessionStatus::Stopped | SessionStatus::Failed => {
                self.terminated_at.get_or_insert(now);
            }
            _ => {}
        }

        let mut detail_map = detail([
            ("from", self.status.to_string()),
            ("to", next.to_string()),
        ]);
        detail_map.extend(extra);

        self.status = next;
        self.updated_at = now;
        self.event_history.push(SessionEvent {
            kind: SessionEventKind::StatusChanged,
            timestamp: now,
            source: source.to_string(),
            detail: detail_map,
        });
        Ok(())
    }

    /// Append a non-transition event, refreshing `updated_at`.
    pub fn append_event(&mut self, kind: SessionEventKind, source: &str, detail: MetadataMap) {
        let event = SessionEvent::now(kind, source, detail);
        self.updated_at = event.timestamp;
        self.event_history.push(event);
    }

    /// Total wall-clock lifetime, once the session has terminated.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.terminated_at.map(|t| t - self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("p1", CreateSessionOptions::default())
    }

    #[test]
    fn test_new_session_defaults() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Creating);
        assert_eq!(s.project_id, "p1");
        assert!(s.task_handle.is_none());
        assert!(s.network_address.is_none());
        assert!(s.connect_url.is_none());
        assert_eq!(s.retry_count, 0);
        assert_eq!(s.billing, BillingInfo::default());
        assert_eq!(s.event_history.len(), 1);
        assert_eq!(s.event_history[0].kind, SessionEventKind::Created);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = session();
        for next in [
            SessionStatus::Provisioning,
            SessionStatus::Starting,
            SessionStatus::Ready,
            SessionStatus::Active,
            SessionStatus::Terminating,
            SessionStatus::Stopped,
        ] {
            s.transition(next, "orchestrator", MetadataMap::new()).unwrap();
            assert_eq!(s.status, next);
        }
        assert!(s.provisioning_started_at.is_some());
        assert!(s.ready_at.is_some());
        assert!(s.last_active_at.is_some());
        assert!(s.terminated_at.is_some());
        assert!(s.duration().is_some());
    }

    #[test]
    fn test_terminal_states_never_transition() {
        for terminal in [SessionStatus::Stopped, SessionStatus::Failed] {
            for next in [
                SessionStatus::Creating,
                SessionStatus::Provisioning,
                SessionStatus::Starting,
                SessionStatus::Ready,
                SessionStatus::Active,
                SessionStatus::Terminating,
                SessionStatus::Stopped,
                SessionStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_ready_to_creating_rejected() {
        let mut s = session();
        s.transition(SessionStatus::Provisioning, "orchestrator", MetadataMap::new())
            .unwrap();
        s.transition(SessionStatus::Ready, "orchestrator", MetadataMap::new())
            .unwrap();
        let err = s
            .transition(SessionStatus::Creating, "orchestrator", MetadataMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(s.status, SessionStatus::Ready);
    }

    #[test]
    fn test_transition_appends_chronological_events() {
        let mut s = session();
        s.transition(SessionStatus::Provisioning, "orchestrator", MetadataMap::new())
            .unwrap();
        s.transition(SessionStatus::Starting, "scheduler", MetadataMap::new())
            .unwrap();
        let times: Vec<_> = s.event_history.iter().map(|e| e.timestamp).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(s.event_history.last().unwrap().source, "scheduler");
        assert_eq!(
            s.event_history.last().unwrap().detail["to"].as_str(),
            Some("STARTING")
        );
    }

    #[test]
    fn test_milestones_set_once() {
        let mut s = session();
        s.transition(SessionStatus::Provisioning, "orchestrator", MetadataMap::new())
            .unwrap();
        let first = s.provisioning_started_at.unwrap();
        s.transition(SessionStatus::Failed, "orchestrator", MetadataMap::new())
            .unwrap();
        assert_eq!(s.provisioning_started_at.unwrap(), first);
    }

    #[test]
    fn test_predicates() {
        assert!(SessionStatus::Starting.is_active());
        assert!(SessionStatus::Ready.is_active());
        assert!(SessionStatus::Active.is_active());
        assert!(!SessionStatus::Creating.is_active());
        assert!(!SessionStatus::Stopped.is_active());

        assert!(SessionStatus::Stopped.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Terminating.is_terminal());

        assert!(SessionStatus::Ready.is_usable());
        assert!(!SessionStatus::Starting.is_usable());
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&SessionStatus::Provisioning).unwrap();
        assert_eq!(json, "\"PROVISIONING\"");
    }

    #[test]
    fn test_session_roundtrip() {
        let mut s = session();
        s.user_metadata
            .insert("team".into(), crate::metadata::MetadataValue::from("qa"));
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.status, s.status);
        assert_eq!(back.user_metadata, s.user_metadata);
    }
}
