//! Backend relay service.
//!
//! Sits between any number of clients and a single wallet engine. Client
//! commands are renumbered into the engine's ID space and replies mapped
//! back; engine notifications fan out to every subscribed client.
//!
//! ```text
//!  client A ─┐                       ┌──────────────┐
//!  client B ─┼─ ClientFrame ───────► │ relay task   │ ── EngineRequest ──► engine
//!  client C ─┘ ◄── ServiceFrame ──── │ id remapping │ ◄── EngineMessage ──
//!                                    └──────┬───────┘
//!                                           │ tunnelHttp
//!                                           ▼
//!                                       event bus
//! ```

use crate::domain::config::EngineConfig;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{EngineError, TransportError};
use crate::engine::protocol::{EngineMessage, EngineRequest};
use crate::ipc::frames::{ClientFrame, ReplyFrame, RequestFrame, ServiceFrame};
use crate::ports::outbound::{BackendConnector, BackendLink, EngineConnector, EngineLink};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wallet_bus::{EventPublisher, InMemoryEventBus, WalletEvent};

/// Engine ID used for service-internal `init` requests. Client commands
/// are numbered from 1.
const INIT_REQUEST_ID: u64 = 0;

type ClientId = u64;

enum ServiceCommand {
    Attach {
        client: ClientId,
        replies: mpsc::UnboundedSender<ServiceFrame>,
    },
    Frame {
        client: ClientId,
        frame: ClientFrame,
    },
    Detach {
        client: ClientId,
    },
    Stop,
}

/// A command forwarded to the engine and not yet answered.
struct InFlight {
    client: ClientId,
    client_id: CorrelationId,
    operation: String,
}

pub struct BackendService;

impl BackendService {
    /// Start the engine, send it `init`, and begin relaying.
    pub async fn spawn(
        engine: Arc<dyn EngineConnector>,
        config: &EngineConfig,
        bus: Arc<InMemoryEventBus>,
    ) -> Result<ServiceHandle, EngineError> {
        let link = engine.start().await?;
        let (commands, command_rx) = mpsc::unbounded_channel();

        let relay = Relay {
            engine,
            database_path: config.database_path(),
            restart_backoff: config.restart_initial_backoff,
            config: config.clone(),
            bus,
            link,
            next_engine_id: 1,
            in_flight: HashMap::new(),
            clients: HashMap::new(),
            subscribers: BTreeSet::new(),
        };
        relay.send_init();
        let task = tokio::spawn(relay.run(command_rx));

        Ok(ServiceHandle {
            inner: Arc::new(HandleInner {
                commands,
                next_client: AtomicU64::new(1),
                task: parking_lot::Mutex::new(Some(task)),
            }),
        })
    }
}

struct HandleInner {
    commands: mpsc::UnboundedSender<ServiceCommand>,
    next_client: AtomicU64,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Entry point for clients. Cheap to clone.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<HandleInner>,
}

impl ServiceHandle {
    /// Stop relaying. Client links end and the engine is shut down.
    pub async fn stop(&self) {
        let _ = self.inner.commands.send(ServiceCommand::Stop);
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.commands.is_closed()
    }
}

#[async_trait]
impl BackendConnector for ServiceHandle {
    async fn connect(&self) -> Result<BackendLink, TransportError> {
        let client = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        self.inner
            .commands
            .send(ServiceCommand::Attach {
                client,
                replies: reply_tx,
            })
            .map_err(|_| TransportError::ServiceStopped)?;

        let commands = self.inner.commands.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if commands.send(ServiceCommand::Frame { client, frame }).is_err() {
                    return;
                }
            }
            let _ = commands.send(ServiceCommand::Detach { client });
        });

        Ok(BackendLink {
            outbound: frame_tx,
            inbound: reply_rx,
        })
    }
}

struct Relay {
    engine: Arc<dyn EngineConnector>,
    config: EngineConfig,
    database_path: PathBuf,
    /// Wait before the next restart after the engine exits on its own
    restart_backoff: Duration,
    bus: Arc<InMemoryEventBus>,
    link: EngineLink,
    next_engine_id: u64,
    in_flight: HashMap<u64, InFlight>,
    clients: HashMap<ClientId, mpsc::UnboundedSender<ServiceFrame>>,
    subscribers: BTreeSet<ClientId>,
}

impl Relay {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ServiceCommand>) {
        info!("Backend service started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ServiceCommand::Stop) | None => break,
                    Some(command) => self.handle_command(command),
                },
                message = self.link.messages.recv() => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_engine_message(message).await {
                            error!(error = %e, "Wallet engine could not be restarted");
                            break;
                        }
                    }
                    None => {
                        let delay = self.restart_backoff;
                        warn!(
                            retry_in_ms = delay.as_millis() as u64,
                            "Wallet engine exited, restarting"
                        );
                        self.fail_in_flight();
                        if !self.wait_for_restart(delay, &mut commands).await {
                            break;
                        }
                        self.restart_backoff = self.config.next_restart_backoff(delay);
                        if let Err(e) = self.restart_engine().await {
                            error!(error = %e, "Wallet engine could not be restarted");
                            break;
                        }
                    }
                },
            }
        }
        info!(clients = self.clients.len(), "Backend service stopped");
    }

    /// Sleep for `delay` while still serving clients. Returns false if the
    /// service was stopped meanwhile.
    async fn wait_for_restart(
        &mut self,
        delay: Duration,
        commands: &mut mpsc::UnboundedReceiver<ServiceCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = commands.recv() => match command {
                    Some(ServiceCommand::Stop) | None => return false,
                    Some(command) => self.handle_command(command),
                },
            }
        }
    }

    fn handle_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Attach { client, replies } => {
                debug!(client = client, "Client attached");
                self.clients.insert(client, replies);
            }
            ServiceCommand::Frame { client, frame } => self.handle_frame(client, frame),
            ServiceCommand::Detach { client } => {
                debug!(client = client, "Client detached");
                self.clients.remove(&client);
                self.subscribers.remove(&client);
            }
            ServiceCommand::Stop => {}
        }
    }

    fn handle_frame(&mut self, client: ClientId, frame: ClientFrame) {
        match frame {
            ClientFrame::Command(request) => self.forward(client, request),
            ClientFrame::Subscribe => {
                debug!(client = client, "Subscribing client");
                self.subscribers.insert(client);
            }
            ClientFrame::Unsubscribe => {
                debug!(client = client, "Unsubscribing client");
                self.subscribers.remove(&client);
            }
        }
    }

    fn forward(&mut self, client: ClientId, request: RequestFrame) {
        if request.id.as_u64() == 0 {
            error!(client = client, "Client command without request ID");
            return;
        }
        if request.operation.is_empty() {
            error!(client = client, "Client command without operation");
            return;
        }

        let engine_id = self.next_engine_id;
        self.next_engine_id += 1;
        debug!(
            client = client,
            correlation_id = %request.id,
            engine_id = engine_id,
            operation = %request.operation,
            "Forwarding command to engine"
        );

        let sent = self.link.requests.send(EngineRequest {
            operation: request.operation.clone(),
            id: engine_id,
            args: request.args,
        });
        if sent.is_err() {
            warn!(operation = %request.operation, "Wallet engine input closed");
        }
        // Recorded even if the send failed; the restart path fails it.
        self.in_flight.insert(
            engine_id,
            InFlight {
                client,
                client_id: request.id,
                operation: request.operation,
            },
        );
    }

    async fn handle_engine_message(&mut self, message: EngineMessage) -> Result<(), EngineError> {
        match message {
            EngineMessage::Notification => self.notify_subscribers(),
            EngineMessage::TunnelHttp { mut request } => {
                debug!("Engine requested an HTTP tunnel");
                request.insert("type".into(), Value::String("tunnelHttp".into()));
                self.bus
                    .publish(WalletEvent::TunnelRequest(Value::Object(request)))
                    .await;
            }
            EngineMessage::Response {
                operation,
                id,
                is_error,
                result,
            } => match operation.as_str() {
                "init" => {
                    debug!("Wallet engine initialized");
                    if !is_error {
                        self.restart_backoff = self.config.restart_initial_backoff;
                    }
                    self.notify_subscribers();
                }
                "reset" => {
                    info!("Wallet reset, restarting engine");
                    if let Some(id) = id {
                        self.reply(id, is_error, result.unwrap_or_else(|| json!({})));
                    }
                    self.restart_engine().await?;
                }
                _ => match id {
                    Some(id) => self.reply(id, is_error, result.unwrap_or_else(|| json!({}))),
                    None => warn!(operation = %operation, "Engine response without request ID"),
                },
            },
            EngineMessage::Error {
                operation,
                id,
                error,
            } => match id {
                Some(id) => self.reply(id, true, error),
                None => warn!(operation = %operation, error = %error, "Engine error without request ID"),
            },
            EngineMessage::Unknown => warn!("Unknown message type from wallet engine"),
        }
        Ok(())
    }

    fn reply(&mut self, engine_id: u64, is_error: bool, result: Value) {
        let Some(call) = self.in_flight.remove(&engine_id) else {
            warn!(engine_id = engine_id, "Wallet engine returned unknown request ID");
            return;
        };
        let Some(client) = self.clients.get(&call.client) else {
            debug!(client = call.client, operation = %call.operation, "Reply for detached client");
            return;
        };

        debug!(
            client = call.client,
            correlation_id = %call.client_id,
            engine_id = engine_id,
            operation = %call.operation,
            is_error = is_error,
            "Relaying reply"
        );
        let frame = ServiceFrame::Reply(ReplyFrame {
            id: call.client_id,
            operation: call.operation,
            is_error,
            result,
        });
        if client.send(frame).is_err() {
            self.drop_client(call.client);
        }
    }

    fn notify_subscribers(&mut self) {
        let dead: Vec<ClientId> = self
            .subscribers
            .iter()
            .copied()
            .filter(|client| {
                self.clients
                    .get(client)
                    .map_or(true, |replies| replies.send(ServiceFrame::Notification).is_err())
            })
            .collect();
        for client in dead {
            debug!(client = client, "Pruning unreachable subscriber");
            self.drop_client(client);
        }
    }

    fn drop_client(&mut self, client: ClientId) {
        self.clients.remove(&client);
        self.subscribers.remove(&client);
    }

    /// Replace the engine. Commands in flight on the old one get an error
    /// reply, then the new engine is initialized.
    async fn restart_engine(&mut self) -> Result<(), EngineError> {
        self.fail_in_flight();
        self.link = self.engine.start().await?;
        self.send_init();
        Ok(())
    }

    fn fail_in_flight(&mut self) {
        let orphaned: Vec<u64> = self.in_flight.keys().copied().collect();
        for engine_id in orphaned {
            self.reply(
                engine_id,
                true,
                json!({"message": "wallet engine restarted before replying"}),
            );
        }
    }

    fn send_init(&self) {
        let mut args = Map::new();
        args.insert(
            "persistentStoragePath".into(),
            Value::String(self.database_path.display().to_string()),
        );
        let init = EngineRequest {
            operation: "init".into(),
            id: INIT_REQUEST_ID,
            args: Value::Object(args),
        };
        if self.link.requests.send(init).is_err() {
            warn!("Wallet engine input closed before init");
        }
    }
}
