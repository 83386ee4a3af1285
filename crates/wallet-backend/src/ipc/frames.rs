//! Frames exchanged between a client and the backend service.
//!
//! Client to service: `command`, `subscribe`, `unsubscribe`.
//! Service to client: `reply`, `notification`.

use crate::domain::correlation::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command for the wallet engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub operation: String,
    pub id: CorrelationId,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

impl RequestFrame {
    /// Build a command frame. Missing arguments become `{}`.
    pub fn new(operation: impl Into<String>, id: CorrelationId, args: Option<Value>) -> Self {
        Self {
            operation: operation.into(),
            id,
            args: args.unwrap_or_else(empty_args),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientFrame {
    Command(RequestFrame),
    /// Start receiving notifications on this link
    Subscribe,
    /// Stop receiving notifications on this link
    Unsubscribe,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Command(_) => "command",
            ClientFrame::Subscribe => "subscribe",
            ClientFrame::Unsubscribe => "unsubscribe",
        }
    }
}

/// The engine's answer to a command, echoing the command's ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFrame {
    pub id: CorrelationId,
    pub operation: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServiceFrame {
    Reply(ReplyFrame),
    /// Payload-free hint that wallet state may have changed
    Notification,
}
