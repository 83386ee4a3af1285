//! # Wallet Model
//!
//! Observable wallet state built on the backend client: balances, pending
//! operations, the withdrawal and payment flows, and history.
//!
//! Every manager publishes its state through a `tokio::sync::watch`
//! channel. Replies are applied by tasks awaiting the request's
//! [`PendingReply`](wallet_backend::PendingReply), never by the receive path.
//!
//! ## Stale replies
//!
//! - Refreshed values (balances, pending operations) are single-flight. A
//!   reconnect or reset starts a new epoch; replies from an older epoch are
//!   dropped.
//! - Flows (withdrawal, payment) carry a generation that every restart or
//!   cancel bumps. A reply is applied only if its generation is still
//!   current, checked under the same lock that writes the status.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod balance;
pub mod context;
pub mod error;
mod flow;
pub mod history;
pub mod model;
pub mod payment;
pub mod pending;
mod refresh;
pub mod uri;
pub mod withdraw;

pub use balance::{BalanceManager, BalanceState};
pub use context::WalletContext;
pub use error::{ModelError, UriError};
pub use history::HistoryManager;
pub use model::WalletModel;
pub use payment::{pay_status_from_reply, PayStatus, PaymentManager};
pub use pending::{PendingOperationsManager, PendingOperationsState};
pub use refresh::LoadState;
pub use uri::{parse_taler_uri, UriAction};
pub use withdraw::{WithdrawManager, WithdrawStatus};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::WalletContext;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};
    use wallet_backend::ipc::channel::{channel_connector, PeerLink};
    use wallet_backend::ipc::{ClientFrame, RequestFrame};
    use wallet_backend::{BridgeConfig, WalletBackendApi};
    use wallet_bus::{EventFilter, EventTopic, InMemoryEventBus, WalletEvent};

    const WAIT: Duration = Duration::from_secs(2);

    /// A backend client connected to an in-memory service end.
    pub(crate) struct Harness {
        pub api: Arc<WalletBackendApi>,
        pub context: WalletContext,
        pub peer: PeerLink,
        pub links: mpsc::UnboundedReceiver<PeerLink>,
    }

    pub(crate) fn fast_config() -> BridgeConfig {
        BridgeConfig {
            default_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_millis(10),
            reconnect_initial_backoff: Duration::from_millis(10),
            reconnect_max_backoff: Duration::from_millis(50),
            ..BridgeConfig::default()
        }
    }

    /// Start a client and wait until its first link is fully up, so that
    /// managers created afterwards see no connection event.
    pub(crate) async fn connected() -> Harness {
        let (connector, mut links) = channel_connector();
        let bus = Arc::new(InMemoryEventBus::new());
        let mut connection = bus.subscribe(EventFilter::topics(vec![EventTopic::Connection]));
        let api = WalletBackendApi::start(Arc::new(connector), bus, fast_config());

        let mut peer = tokio::time::timeout(WAIT, links.recv())
            .await
            .expect("no link accepted")
            .expect("connector dropped");
        assert_eq!(peer.frames.recv().await, Some(ClientFrame::Subscribe));
        loop {
            let event = tokio::time::timeout(WAIT, connection.recv())
                .await
                .expect("no connection event")
                .expect("bus closed");
            if event == WalletEvent::BackendConnected {
                break;
            }
        }

        let context = WalletContext::new(Arc::clone(&api));
        Harness {
            api,
            context,
            peer,
            links,
        }
    }

    impl Harness {
        /// Next command, which must be `operation`.
        pub(crate) async fn expect(&mut self, operation: &str) -> RequestFrame {
            let command = tokio::time::timeout(WAIT, self.peer.next_command())
                .await
                .unwrap_or_else(|_| panic!("no {operation} command"))
                .expect("link closed");
            assert_eq!(command.operation, operation);
            command
        }

        /// Assert nothing else was sent.
        pub(crate) async fn expect_silence(&mut self) {
            settle().await;
            if let Ok(frame) = self.peer.frames.try_recv() {
                panic!("unexpected frame {frame:?}");
            }
        }

        /// Drop the current link and return the next one.
        pub(crate) async fn reconnect(&mut self) {
            let (_, frames) = mpsc::unbounded_channel();
            let (replies, _) = mpsc::unbounded_channel();
            drop(std::mem::replace(&mut self.peer, PeerLink { frames, replies }));
            let mut peer = tokio::time::timeout(WAIT, self.links.recv())
                .await
                .expect("no reconnect")
                .expect("connector dropped");
            assert_eq!(peer.frames.recv().await, Some(ClientFrame::Subscribe));
            self.peer = peer;
        }
    }

    pub(crate) async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Wait until `rx` holds a value matching `predicate`.
    pub(crate) async fn wait_until<S>(rx: &mut watch::Receiver<S>, predicate: impl FnMut(&S) -> bool) -> S
    where
        S: Clone,
    {
        tokio::time::timeout(WAIT, rx.wait_for(predicate))
            .await
            .expect("state never reached")
            .expect("state channel closed")
            .clone()
    }
}
