//! # Wallet Bus - Notification Fan-out
//!
//! Delivers unsolicited engine pushes and connection changes to every
//! interested component of the wallet client.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────────┐
//! │  Transport   │                    │ Balance manager  │
//! │  supervisor  │    publish()       ├──────────────────┤
//! │              │ ──────┐            │ Pending manager  │
//! └──────────────┘       │            └──────────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe() / spawn_listener()
//! ```
//!
//! ## Lifecycle
//!
//! - A [`Subscription`] deregisters itself when dropped.
//! - [`spawn_listener`] holds its listener weakly and stops once the
//!   listener is gone; the returned [`ListenerHandle`] stops it eagerly.
//! - A panicking listener is logged and skipped; other listeners still
//!   receive the event.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod listener;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, WalletEvent};
pub use listener::{spawn_listener, EventListener, ListenerHandle};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::Subscription;

/// Maximum events to buffer per subscriber before the oldest are skipped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
