//! Outbound ports: how a client reaches the backend service, and how the
//! service reaches the wallet engine.

use crate::domain::error::{EngineError, TransportError};
use crate::engine::protocol::{EngineMessage, EngineRequest};
use crate::ipc::frames::{ClientFrame, ServiceFrame};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// An established client link to the backend service.
///
/// The link is up while `inbound` yields frames; it ends when `inbound`
/// returns `None`.
#[derive(Debug)]
pub struct BackendLink {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<ServiceFrame>,
}

/// Establishes links to the backend service.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Result<BackendLink, TransportError>;
}

/// A running wallet engine.
#[derive(Debug)]
pub struct EngineLink {
    pub requests: mpsc::UnboundedSender<EngineRequest>,
    pub messages: mpsc::UnboundedReceiver<EngineMessage>,
}

/// Starts wallet engine instances.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn start(&self) -> Result<EngineLink, EngineError>;
}
