//! # Event Listeners
//!
//! Lifecycle-scoped delivery of bus events to long-lived components.

use crate::events::{EventFilter, WalletEvent};
use crate::publisher::InMemoryEventBus;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Weak;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A component that reacts to bus events.
///
/// `on_event` runs on the listener task and must not block; components that
/// need to do I/O spawn it.
pub trait EventListener: Send + Sync + 'static {
    fn on_event(&self, event: &WalletEvent);
}

/// Keeps a listener task alive. Dropping it stops delivery.
#[derive(Debug)]
pub struct ListenerHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Deliver events matching `filter` to `listener` until the listener is
/// dropped, the handle is dropped, or the bus closes.
///
/// The subscription is registered before this returns, so no event published
/// afterwards is missed. Must be called within a Tokio runtime.
pub fn spawn_listener<L: EventListener>(
    bus: &InMemoryEventBus,
    filter: EventFilter,
    listener: Weak<L>,
    name: &'static str,
) -> ListenerHandle {
    let mut subscription = bus.subscribe(filter);
    let task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let Some(target) = listener.upgrade() else {
                debug!(listener = name, "Listener gone, ending subscription");
                break;
            };
            if catch_unwind(AssertUnwindSafe(|| target.on_event(&event))).is_err() {
                error!(listener = name, topic = ?event.topic(), "Listener panicked while handling event");
            }
        }
    });
    ListenerHandle { name, task }
}
