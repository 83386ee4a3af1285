//! # Notification Bus
//!
//! The connection supervisor and the relay publish here; balance and pending
//! managers, the runtime's tunnel forwarder and tests subscribe.

use crate::events::{EventFilter, WalletEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Publishing side of the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Fan `event` out to every live subscription, matching or not.
    ///
    /// Returns how many subscriptions were handed the event.
    async fn publish(&self, event: WalletEvent) -> usize;
}

/// Broadcast-backed bus shared by every component of one wallet client.
#[derive(Debug)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<WalletEvent>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may fall behind before it
    /// starts skipping events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register interest in events matching `filter`.
    ///
    /// Everything published after this returns is seen by the subscription.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "Bus subscription opened");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Live subscriptions, including listener tasks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: WalletEvent) -> usize {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = ?topic, receivers, "Event published");
                receivers
            }
            Err(_) => {
                // Pushes only ask listeners to re-query, so losing one with
                // nobody subscribed is harmless.
                trace!(topic = ?topic, "No subscribers for event");
                0
            }
        }
    }
}
