//! # Wallet Backend Bridge
//!
//! Client request/response and notification bridge to the wallet engine.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      WalletBackendApi (client)                      │
//! │                                                                    │
//! │  send_request(op, args) ──► RequestRouter ──► TransportBinding ─┐  │
//! │          ▲                     │ register          (queue while │  │
//! │          │ PendingReply        ▼                    disconnected)│  │
//! │          └──────────── PendingCallTable ◄── reply ──┐           │  │
//! │                        (oneshot per call,           │           │  │
//! │                         expiry sweeper)             │           │  │
//! │                                          supervisor task        │  │
//! │                                     notification ──► event bus  │  │
//! └─────────────────────────────────────────────────────┬──────────┼──┘
//!                                          ServiceFrame │          │ ClientFrame
//!                                                       │          ▼
//! ┌─────────────────────────────────────────────────────┴─────────────┐
//! │                 BackendService (relay, id remapping)               │
//! └──────────────────────────────┬─────────────────────────────────────┘
//!                                │ JSON lines
//!                                ▼
//!                           wallet engine
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wallet_backend::{BackendService, ProcessEngine, WalletBackendApi, WalletConfig};
//!
//! let config = WalletConfig::default();
//! let engine = Arc::new(ProcessEngine::from_config(&config.engine));
//! let service = BackendService::spawn(engine, &config.engine, Arc::clone(&bus)).await?;
//! let api = WalletBackendApi::start(Arc::new(service), bus, config.bridge);
//! let balances = api.request("getBalances", None).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod domain;
pub mod engine;
pub mod ipc;
pub mod ports;
pub mod service;

pub use client::WalletBackendApi;
pub use domain::{
    BridgeConfig, BridgeError, CallOutcome, ConfigError, CorrelationId, EngineConfig, EngineError,
    TransportError, WalletConfig,
};
pub use engine::{EngineMessage, EngineRequest, ProcessEngine};
pub use ipc::{ConnectionState, PendingReply};
pub use ports::{BackendConnector, BackendLink, EngineConnector, EngineLink};
pub use service::{BackendService, ServiceHandle};
