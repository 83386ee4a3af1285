//! Error types for the backend bridge.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Why a call did not produce a successful reply.
///
/// Delivered through the call's one-shot channel, so it is `Clone` and
/// carries only owned data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// The link to the backend went away while the call was outstanding.
    #[error("backend link lost")]
    Disconnected,

    /// No reply arrived within the call's timeout.
    #[error("no reply to '{operation}' after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// The backend answered with its error flag set. `payload` is the raw
    /// error object, kept for diagnostics.
    #[error("backend rejected '{operation}': {payload}")]
    Backend { operation: String, payload: Value },

    /// The reply arrived but did not have the expected shape.
    #[error("malformed reply to '{operation}': {message}")]
    Decode { operation: String, message: String },

    /// The client was shut down before a reply arrived.
    #[error("backend client shut down")]
    Shutdown,
}

impl BridgeError {
    /// Text suitable for showing in an error state.
    ///
    /// Backend errors surface their raw payload; everything else its message.
    pub fn diagnostic(&self) -> String {
        match self {
            BridgeError::Backend { payload, .. } => payload.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Failure to establish or use a link to the backend service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to backend: {0}")]
    ConnectFailed(String),

    #[error("backend link closed")]
    ChannelClosed,

    #[error("backend service stopped")]
    ServiceStopped,
}

/// Failure to start or talk to the wallet engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn wallet engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wallet engine {0} not captured")]
    Stdio(&'static str),

    #[error("wallet engine link closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_diagnostic_is_raw_payload() {
        let err = BridgeError::Backend {
            operation: "confirmPay".into(),
            payload: json!({"message": "insufficient funds"}),
        };
        assert_eq!(err.diagnostic(), r#"{"message":"insufficient funds"}"#);
    }

    #[test]
    fn test_timeout_message() {
        let err = BridgeError::Timeout {
            operation: "getBalances".into(),
            after: Duration::from_millis(1500),
        };
        assert!(err.is_timeout());
        assert_eq!(err.diagnostic(), "no reply to 'getBalances' after 1500ms");
    }
}
