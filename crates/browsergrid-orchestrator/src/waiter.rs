//! Check-then-subscribe-then-recheck readiness primitive.
//!
//! Waiting for a session state without polling has a built-in race: the
//! notification can fire between the initial store read and the subscribe.
//! The primitive closes it by checking the store, subscribing, and
//! checking again before suspending. Notifications are advisory only;
//! every wake triggers a fresh store read.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use browsergrid_bus::{BusError, CoordinationBus};
use browsergrid_core::{Error, Session};
use browsergrid_store::SessionStore;

/// Verdict of one store read during a wait.
pub enum WaitCheck {
    /// The awaited condition holds; return the session.
    Done,
    /// The session can no longer reach the condition; fail with this error.
    Fail(Error),
    /// Keep waiting.
    Pending,
}

/// Races a bus subscription against a timer and caller cancellation,
/// re-reading the store on every wake.
pub struct StateWaiter {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn CoordinationBus>,
}

impl StateWaiter {
    pub fn new(store: Arc<dyn SessionStore>, bus: Arc<dyn CoordinationBus>) -> Self {
        Self { store, bus }
    }

    async fn read(&self, session_id: &str) -> Result<Session, Error> {
        self.store
            .get(session_id)
            .await
            .map_err(Error::from)?
            .map(|record| record.session)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    /// Wait until `check` reports done or fail, bounded by `timeout` and
    /// `cancel`.
    ///
    /// The fast path returns without ever subscribing when the condition
    /// already holds.
    pub async fn wait_until<F>(
        &self,
        session_id: &str,
        channel: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        check: F,
    ) -> Result<Session, Error>
    where
        F: Fn(&Session) -> WaitCheck + Send + Sync,
    {
        let session = self.read(session_id).await?;
        match check(&session) {
            WaitCheck::Done => return Ok(session),
            WaitCheck::Fail(err) => return Err(err),
            WaitCheck::Pending => {}
        }

        let mut subscription = self.bus.subscribe(channel).await.map_err(Error::from)?;

        // The notification may have fired between the first read and the
        // subscribe; re-read before suspending.
        let session = self.read(session_id).await?;
        match check(&session) {
            WaitCheck::Done => return Ok(session),
            WaitCheck::Fail(err) => return Err(err),
            WaitCheck::Pending => {}
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id, "wait cancelled by caller");
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(session_id, ?timeout, "wait timed out");
                    return Err(Error::Timeout(timeout));
                }
                message = subscription.recv() => {
                    match message {
                        Ok(notification) => {
                            trace!(session_id, status = %notification.status, "woken by notification");
                        }
                        // Missed messages are recoverable: the store read
                        // below is authoritative.
                        Err(BusError::Lagged(skipped)) => {
                            debug!(session_id, skipped, "subscriber lagged, re-reading store");
                        }
                        Err(err) => return Err(err.into()),
                    }

                    let session = self.read(session_id).await?;
                    match check(&session) {
                        WaitCheck::Done => return Ok(session),
                        WaitCheck::Fail(err) => return Err(err),
                        WaitCheck::Pending => {}
                    }
                }
            }
        }
    }
}
