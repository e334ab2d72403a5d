//! Session event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataMap;

/// Kind of a session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Session record created.
    Created,
    /// Status transition applied.
    StatusChanged,
    /// Backing task was started and a handle recorded.
    TaskStarted,
    /// Best-effort task stop failed; session termination proceeded anyway.
    TaskStopFailed,
    /// Session terminated by a caller.
    Terminated,
}

/// One entry in a session's append-only event history.
///
/// Entries are appended in chronological order and never mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
    /// Component that produced the event (e.g. "orchestrator", "scheduler").
    pub source: String,
    #[serde(default, skip_serializing_if = "MetadataMap::is_empty")]
    pub detail: MetadataMap,
}

impl SessionEvent {
    /// Create an event stamped with the current time.
    pub fn now(kind: SessionEventKind, source: impl Into<String>, detail: MetadataMap) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            source: source.into(),
            detail,
        }
    }
}
