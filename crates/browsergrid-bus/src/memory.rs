//! In-memory coordination bus over per-channel broadcast senders.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::bus::{BusError, BusSubscription, CoordinationBus, ReadyNotification};

const CHANNEL_CAPACITY: usize = 16;

/// In-memory bus for single-process deployments and tests.
///
/// Each channel maps to its own broadcast sender; entries are dropped once
/// the last subscriber goes away and a publish finds no receivers.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    channels: Arc<DashMap<String, broadcast::Sender<ReadyNotification>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<ReadyNotification> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CoordinationBus for InMemoryBus {
    async fn publish(&self, channel: &str, payload: &ReadyNotification) -> Result<(), BusError> {
        // send() errors only when there are no receivers, which is fine:
        // the waiter may have taken the fast path and never subscribed.
        let receivers = self.sender(channel).send(payload.clone()).unwrap_or(0);
        trace!(channel, receivers, "published ready notification");
        if receivers == 0 {
            self.channels
                .remove_if(channel, |_, sender| sender.receiver_count() == 0);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, BusError> {
        Ok(Box::new(InMemorySubscription {
            channel: channel.to_string(),
            channels: Arc::clone(&self.channels),
            receiver: Some(self.sender(channel).subscribe()),
        }))
    }
}

struct InMemorySubscription {
    channel: String,
    channels: Arc<DashMap<String, broadcast::Sender<ReadyNotification>>>,
    receiver: Option<broadcast::Receiver<ReadyNotification>>,
}

#[async_trait]
impl BusSubscription for InMemorySubscription {
    async fn recv(&mut self) -> Result<ReadyNotification, BusError> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| BusError::Closed("subscription closed".to_string()))?;
        match receiver.recv().await {
            Ok(msg) => Ok(msg),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(BusError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => {
                Err(BusError::Closed("broadcast channel closed".to_string()))
            }
        }
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        // The receiver must be gone before the count check, otherwise the
        // last subscriber still counts itself and the entry is never freed.
        self.receiver = None;
        self.channels
            .remove_if(&self.channel, |_, sender| sender.receiver_count() == 0);
    }
}
