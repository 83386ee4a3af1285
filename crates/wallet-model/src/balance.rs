//! Balance refresh.

use crate::context::WalletContext;
use crate::refresh::{LoadState, Refresher};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use wallet_bus::{spawn_listener, EventFilter, EventListener, EventTopic, ListenerHandle, WalletEvent};
use wallet_types::{BalancesResponse, WalletBalances};

pub type BalanceState = LoadState<WalletBalances>;

/// Keeps the wallet's per-currency balances current.
///
/// Refreshes on every engine notification and after every (re)connect.
pub struct BalanceManager {
    refresher: Refresher<WalletBalances>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl BalanceManager {
    pub fn new(context: &WalletContext) -> Arc<Self> {
        let manager = Arc::new(Self {
            refresher: Refresher::new("getBalances", context.clone(), decode_balances),
            listener: Mutex::new(None),
        });
        let handle = spawn_listener(
            context.bus(),
            EventFilter::topics(vec![EventTopic::StateChanged, EventTopic::Connection]),
            Arc::downgrade(&manager),
            "balances",
        );
        *manager.listener.lock() = Some(handle);
        manager
    }

    pub fn state(&self) -> watch::Receiver<BalanceState> {
        self.refresher.subscribe()
    }

    pub fn current(&self) -> BalanceState {
        self.refresher.current()
    }

    /// Request balances unless a request is already outstanding.
    pub fn refresh(&self) -> bool {
        self.refresher.refresh()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresher.is_in_flight()
    }

    pub fn reset(&self) {
        self.refresher.reset();
    }
}

impl EventListener for BalanceManager {
    fn on_event(&self, event: &WalletEvent) {
        match event {
            WalletEvent::Notification => {
                self.refresher.refresh();
            }
            WalletEvent::BackendConnected => {
                self.refresher.on_reconnect();
            }
            _ => {}
        }
    }
}

fn decode_balances(value: Value) -> Result<WalletBalances, serde_json::Error> {
    serde_json::from_value::<BalancesResponse>(value).map(WalletBalances::from)
}
