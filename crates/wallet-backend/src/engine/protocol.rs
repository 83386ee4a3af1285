//! JSON-lines protocol spoken by the wallet engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line written to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub operation: String,
    pub id: u64,
    pub args: Value,
}

/// One line read from the engine, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineMessage {
    #[serde(rename = "response")]
    Response {
        operation: String,
        /// Absent for service-internal operations such as `init`
        #[serde(default)]
        id: Option<u64>,
        #[serde(default, rename = "isError")]
        is_error: bool,
        #[serde(default)]
        result: Option<Value>,
    },

    #[serde(rename = "error")]
    Error {
        operation: String,
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        error: Value,
    },

    #[serde(rename = "notification")]
    Notification,

    /// HTTP request to relay over the local tunnel; the whole message is kept
    #[serde(rename = "tunnelHttp")]
    TunnelHttp {
        #[serde(flatten)]
        request: Map<String, Value>,
    },

    #[serde(other)]
    Unknown,
}

impl EngineMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineMessage::Response { .. } => "response",
            EngineMessage::Error { .. } => "error",
            EngineMessage::Notification => "notification",
            EngineMessage::TunnelHttp { .. } => "tunnelHttp",
            EngineMessage::Unknown => "unknown",
        }
    }
}
