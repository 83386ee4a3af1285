//! Shared handles every manager is built from.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use wallet_backend::{PendingReply, WalletBackendApi};
use wallet_bus::InMemoryEventBus;

/// The backend client and the bus its notifications arrive on.
#[derive(Clone)]
pub struct WalletContext {
    api: Arc<WalletBackendApi>,
    bus: Arc<InMemoryEventBus>,
}

impl WalletContext {
    pub fn new(api: Arc<WalletBackendApi>) -> Self {
        let bus = Arc::clone(api.bus());
        Self { api, bus }
    }

    pub fn api(&self) -> &Arc<WalletBackendApi> {
        &self.api
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn send_request(&self, operation: &str, args: Option<Value>) -> PendingReply {
        self.api.send_request(operation, args)
    }

    /// Send a command whose reply nobody waits for. Failures are logged.
    pub fn send_detached(&self, operation: &'static str, args: Option<Value>) {
        let reply = self.api.send_request(operation, args);
        tokio::spawn(async move {
            match reply.await {
                Ok(_) => debug!(operation = operation, "Command acknowledged"),
                Err(e) => warn!(operation = operation, error = %e, "Command failed"),
            }
        });
    }
}
