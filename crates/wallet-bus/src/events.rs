//! # Wallet Events
//!
//! Everything published on the bus, with the topic used for filtering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event published on the wallet bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum WalletEvent {
    /// The engine reported that client-visible state may have changed.
    /// Carries no payload: receivers re-query what they care about.
    Notification,

    /// The link to the backend service was (re-)established.
    BackendConnected,

    /// The link to the backend service was lost.
    BackendDisconnected,

    /// The engine asked to relay an HTTP request over the local tunnel.
    TunnelRequest(Value),
}

impl WalletEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            WalletEvent::Notification => EventTopic::StateChanged,
            WalletEvent::BackendConnected | WalletEvent::BackendDisconnected => {
                EventTopic::Connection
            }
            WalletEvent::TunnelRequest(_) => EventTopic::Tunnel,
        }
    }
}

/// Event topics for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Engine notifications.
    StateChanged,
    /// Backend link up/down.
    Connection,
    /// Tunnel requests.
    Tunnel,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &WalletEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(WalletEvent::Notification.topic(), EventTopic::StateChanged);
        assert_eq!(WalletEvent::BackendDisconnected.topic(), EventTopic::Connection);
        assert_eq!(
            WalletEvent::TunnelRequest(serde_json::json!({})).topic(),
            EventTopic::Tunnel
        );
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        assert!(filter.matches(&WalletEvent::Notification));
        assert!(filter.matches(&WalletEvent::BackendConnected));
    }

    #[test]
    fn test_filter_topics() {
        let filter = EventFilter::topics(vec![EventTopic::Connection]);
        assert!(filter.matches(&WalletEvent::BackendConnected));
        assert!(!filter.matches(&WalletEvent::Notification));

        let everything = EventFilter::topics(vec![EventTopic::All]);
        assert!(everything.matches(&WalletEvent::Notification));
    }
}
