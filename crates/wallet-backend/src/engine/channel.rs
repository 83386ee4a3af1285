//! In-memory engine for tests.
//!
//! Every `start()` hands the test an [`EngineEnd`] through which it sees
//! the requests the service writes and plays back engine messages.

use crate::domain::error::EngineError;
use crate::engine::protocol::{EngineMessage, EngineRequest};
use crate::ports::outbound::{EngineConnector, EngineLink};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub struct ChannelEngine {
    started: mpsc::UnboundedSender<EngineEnd>,
}

/// The engine's side of one started instance.
#[derive(Debug)]
pub struct EngineEnd {
    pub requests: mpsc::UnboundedReceiver<EngineRequest>,
    pub messages: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineEnd {
    pub async fn next_request(&mut self) -> Option<EngineRequest> {
        self.requests.recv().await
    }

    /// Answer `request` successfully.
    pub fn respond(&self, request: &EngineRequest, result: Value) -> bool {
        self.send(EngineMessage::Response {
            operation: request.operation.clone(),
            id: Some(request.id),
            is_error: false,
            result: Some(result),
        })
    }

    /// Answer `request` with an engine error.
    pub fn fail(&self, request: &EngineRequest, error: Value) -> bool {
        self.send(EngineMessage::Error {
            operation: request.operation.clone(),
            id: Some(request.id),
            error,
        })
    }

    pub fn notify(&self) -> bool {
        self.send(EngineMessage::Notification)
    }

    pub fn send(&self, message: EngineMessage) -> bool {
        self.messages.send(message).is_ok()
    }
}

/// Create an in-memory engine and the stream of instances it starts.
pub fn channel_engine() -> (ChannelEngine, mpsc::UnboundedReceiver<EngineEnd>) {
    let (started, instances) = mpsc::unbounded_channel();
    (ChannelEngine { started }, instances)
}

#[async_trait]
impl EngineConnector for ChannelEngine {
    async fn start(&self) -> Result<EngineLink, EngineError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        self.started
            .send(EngineEnd {
                requests: request_rx,
                messages: message_tx,
            })
            .map_err(|_| EngineError::Closed)?;
        Ok(EngineLink {
            requests: request_tx,
            messages: message_rx,
        })
    }
}
