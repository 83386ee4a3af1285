//! Wallet engine adapter: the JSON-lines protocol and the ways to run an
//! engine.

pub mod channel;
pub mod process;
pub mod protocol;

pub use process::ProcessEngine;
pub use protocol::{EngineMessage, EngineRequest};
