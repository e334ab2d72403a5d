//! Coordination bus trait and message types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use browsergrid_core::Error;

/// Coordination bus error.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Channel closed: {0}")]
    Closed(String),

    /// The subscriber fell behind and missed messages. Advisory-only
    /// semantics make this recoverable: re-read the store.
    #[error("Subscriber lagged on channel, {0} messages skipped")]
    Lagged(u64),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Upstream(err.to_string())
    }
}

/// Payload published when a session becomes ready. Advisory only; the
/// session store remains authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyNotification {
    pub session_id: String,
    pub status: String,
}

/// Channel name for a session's readiness notifications.
///
/// One channel per session; the core never fans a single channel across
/// sessions.
pub fn ready_channel(session_id: &str) -> String {
    format!("session:{session_id}:ready")
}

/// An open subscription to one channel.
#[async_trait]
pub trait BusSubscription: Send {
    /// Receive the next message. Lag surfaces as [`BusError::Lagged`];
    /// a closed channel surfaces as [`BusError::Closed`].
    async fn recv(&mut self) -> Result<ReadyNotification, BusError>;
}

/// Publish/subscribe coordination channel.
#[async_trait]
pub trait CoordinationBus: Send + Sync {
    /// Publish a notification on `channel`. Publishing to a channel with
    /// no subscribers is not an error.
    async fn publish(&self, channel: &str, payload: &ReadyNotification) -> Result<(), BusError>;

    /// Subscribe to `channel`, receiving messages published after this call.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_naming() {
        assert_eq!(ready_channel("abc123"), "session:abc123:ready");
    }
}
