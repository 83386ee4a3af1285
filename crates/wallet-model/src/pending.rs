//! Pending-operations refresh and the user-initiated retry.

use crate::context::WalletContext;
use crate::refresh::{LoadState, Refresher};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use wallet_bus::{spawn_listener, EventFilter, EventListener, EventTopic, ListenerHandle, WalletEvent};
use wallet_types::PendingOperations;

pub type PendingOperationsState = LoadState<PendingOperations>;

pub struct PendingOperationsManager {
    context: WalletContext,
    refresher: Refresher<PendingOperations>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl PendingOperationsManager {
    pub fn new(context: &WalletContext) -> Arc<Self> {
        let manager = Arc::new(Self {
            context: context.clone(),
            refresher: Refresher::new("getPendingOperations", context.clone(), decode_pending),
            listener: Mutex::new(None),
        });
        let handle = spawn_listener(
            context.bus(),
            EventFilter::topics(vec![EventTopic::StateChanged, EventTopic::Connection]),
            Arc::downgrade(&manager),
            "pending-operations",
        );
        *manager.listener.lock() = Some(handle);
        manager
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationsState> {
        self.refresher.subscribe()
    }

    pub fn current(&self) -> PendingOperationsState {
        self.refresher.current()
    }

    pub fn refresh(&self) -> bool {
        self.refresher.refresh()
    }

    /// Ask the engine to retry its pending operations now. The resulting
    /// state change arrives as a notification.
    pub fn retry_pending_now(&self) {
        self.context.send_detached("retryPendingNow", None);
    }
}

impl EventListener for PendingOperationsManager {
    fn on_event(&self, event: &WalletEvent) {
        match event {
            WalletEvent::Notification => {
                self.refresher.refresh();
            }
            WalletEvent::BackendConnected => {
                self.refresher.on_reconnect();
            }
            _ => {}
        }
    }
}

fn decode_pending(value: Value) -> Result<PendingOperations, serde_json::Error> {
    serde_json::from_value(value)
}
