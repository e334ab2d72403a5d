//! Session store trait and record envelope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use browsergrid_core::{Error, Session};

/// Session store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::NotFound(format!("session {id}")),
            other => Error::Upstream(other.to_string()),
        }
    }
}

/// Envelope persisted by a backend: the session plus its storage expiry.
///
/// `expires_at` drives physical record eviction only; it is independent of
/// the logical session status and never inspected by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Wrap a session with a TTL measured from now.
    pub fn with_ttl(session: Session, ttl: Option<std::time::Duration>) -> Self {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok().map(|d| Utc::now() + d));
        Self {
            session,
            expires_at,
        }
    }

    /// Whether the record's storage TTL has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Durable session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write (upsert) a record, keyed by session id.
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Fetch a record by session id. Expired records read as absent.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    /// All records for a project, newest first.
    async fn query_by_project(&self, project_id: &str) -> Result<Vec<SessionRecord>, StoreError>;

    /// Evict expired records, returning how many were removed.
    async fn cleanup(&self) -> Result<usize, StoreError>;
}
