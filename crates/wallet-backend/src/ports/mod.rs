//! Ports for the backend bridge.

pub mod outbound;

pub use outbound::{BackendConnector, BackendLink, EngineConnector, EngineLink};
