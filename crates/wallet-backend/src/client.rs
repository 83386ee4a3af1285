//! Client handle to the wallet backend.
//!
//! [`WalletBackendApi`] owns the transport binding, the request router and
//! two background tasks: the link supervisor, which (re)connects and feeds
//! inbound frames to the router and the bus, and the expiry sweeper.

use crate::domain::config::BridgeConfig;
use crate::domain::error::BridgeError;
use crate::domain::pending::{CallOutcome, PendingCallTable};
use crate::ipc::frames::ServiceFrame;
use crate::ipc::router::{sweep_task, PendingReply, RequestRouter};
use crate::ipc::transport::{ConnectionState, TransportBinding};
use crate::ports::outbound::{BackendConnector, BackendLink};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wallet_bus::{EventPublisher, InMemoryEventBus, WalletEvent};
use wallet_telemetry::{BACKEND_RECONNECTS, NOTIFICATIONS_RECEIVED};

pub struct WalletBackendApi {
    router: Arc<RequestRouter>,
    transport: Arc<TransportBinding>,
    bus: Arc<InMemoryEventBus>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl WalletBackendApi {
    /// Start connecting to the backend. Must be called within a Tokio
    /// runtime.
    ///
    /// Requests may be sent right away; they queue until the first link is
    /// up.
    pub fn start(
        connector: Arc<dyn BackendConnector>,
        bus: Arc<InMemoryEventBus>,
        config: BridgeConfig,
    ) -> Arc<Self> {
        let pending = Arc::new(PendingCallTable::new(config.default_timeout));
        let transport = Arc::new(TransportBinding::new());
        let router = Arc::new(RequestRouter::new(pending, Arc::clone(&transport), &config));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let sweeper = tokio::spawn(sweep_task(Arc::clone(&router), config.cleanup_interval));
        let supervisor = tokio::spawn(supervise(
            connector,
            Arc::clone(&transport),
            Arc::clone(&router),
            Arc::clone(&bus),
            config,
            shutdown_rx,
        ));

        Arc::new(Self {
            router,
            transport,
            bus,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Issue a command without waiting. The reply arrives through the
    /// returned [`PendingReply`].
    pub fn send_request(&self, operation: &str, args: Option<Value>) -> PendingReply {
        self.router.send_request(operation, args)
    }

    /// Issue a command and wait for its reply.
    pub async fn request(&self, operation: &str, args: Option<Value>) -> CallOutcome {
        self.send_request(operation, args).await
    }

    /// Issue a command and decode its reply into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Option<Value>,
    ) -> Result<T, BridgeError> {
        self.send_request(operation, args).decode().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn pending_count(&self) -> usize {
        self.router.pending().pending_count()
    }

    /// Unsubscribe from notifications, stop the background tasks and fail
    /// whatever is still outstanding with `Shutdown`.
    pub async fn shutdown(&self) {
        if self.transport.unsubscribe() {
            debug!("Unsubscribed from backend notifications");
        }
        let _ = self.shutdown.send(true);

        let supervisor = self.supervisor.lock().take();
        if let Some(task) = supervisor {
            let _ = task.await;
        }
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }

        self.transport.detach();
        let failed = self.router.fail_pending(BridgeError::Shutdown);
        info!(failed = failed, "Backend client shut down");
    }
}

impl Drop for WalletBackendApi {
    fn drop(&mut self) {
        for slot in [&self.supervisor, &self.sweeper] {
            if let Some(task) = slot.lock().take() {
                task.abort();
            }
        }
    }
}

async fn supervise(
    connector: Arc<dyn BackendConnector>,
    transport: Arc<TransportBinding>,
    router: Arc<RequestRouter>,
    bus: Arc<InMemoryEventBus>,
    config: BridgeConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = config.reconnect_initial_backoff;

    loop {
        if *shutdown.borrow() {
            break;
        }
        transport.mark_connecting();

        let connected = tokio::select! {
            result = connector.connect() => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(BackendLink { outbound, inbound }) => {
                match transport.attach(outbound) {
                    Ok(_) => {
                        backoff = config.reconnect_initial_backoff;
                        BACKEND_RECONNECTS.inc();
                        bus.publish(WalletEvent::BackendConnected).await;

                        if !pump_inbound(inbound, &router, &bus, &mut shutdown).await {
                            return;
                        }

                        warn!("Backend link lost");
                        transport.detach();
                        bus.publish(WalletEvent::BackendDisconnected).await;
                        if config.fail_pending_on_disconnect {
                            router.fail_pending(BridgeError::Disconnected);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Backend link closed during attach");
                        transport.detach();
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, retry_in_ms = backoff.as_millis(), "Failed to connect to backend");
                transport.detach();
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        backoff = config.next_backoff(backoff);
    }

    debug!("Backend supervisor stopped");
}

/// Feed inbound frames to the router and the bus until the link ends.
///
/// Returns false if shutdown was requested instead.
async fn pump_inbound(
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<ServiceFrame>,
    router: &RequestRouter,
    bus: &InMemoryEventBus,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let frame = tokio::select! {
            frame = inbound.recv() => frame,
            _ = shutdown.changed() => return false,
        };

        match frame {
            Some(ServiceFrame::Reply(reply)) => {
                router.dispatch_reply(reply);
            }
            Some(ServiceFrame::Notification) => {
                NOTIFICATIONS_RECEIVED.inc();
                debug!("Backend notification");
                bus.publish(WalletEvent::Notification).await;
            }
            None => return true,
        }
    }
}
