//! Domain types for the backend bridge: correlation, pending calls,
//! configuration and errors.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;

pub use config::{BridgeConfig, BusConfig, ConfigError, EngineConfig, WalletConfig};
pub use correlation::{CorrelationId, CorrelationIdGenerator};
pub use error::{BridgeError, EngineError, TransportError};
pub use pending::{CallOutcome, PendingCallTable, PendingStats};
