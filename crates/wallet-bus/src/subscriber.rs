//! # Subscriptions
//!
//! A receiver on the notification bus that only yields the topics it asked
//! for.

use crate::events::{EventFilter, WalletEvent};
use tokio::sync::broadcast;
use tracing::warn;

/// Filtered view of the bus. Dropping it deregisters.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<WalletEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<WalletEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next event matching the filter, or `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips what it missed. Every event is
    /// a "re-query" hint or a connection edge whose latest value wins, so
    /// the newest retained event is enough to catch up.
    pub async fn recv(&mut self) -> Option<WalletEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, topics = ?self.filter.topics, "Subscriber fell behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
