//! Wallet history.

use crate::context::WalletContext;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use wallet_backend::BridgeError;
use wallet_types::{HistoryEvent, HistoryResponse};

pub struct HistoryManager {
    context: WalletContext,
    progress: watch::Sender<bool>,
    /// Loads not yet finished or dropped
    outstanding: Mutex<usize>,
}

/// Holds `progress` up for one load, including one whose future is dropped
/// before the reply arrives.
struct LoadGuard<'a> {
    manager: &'a HistoryManager,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        let mut outstanding = self.manager.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.manager.progress.send_replace(false);
        }
    }
}

impl HistoryManager {
    pub fn new(context: &WalletContext) -> Self {
        let (progress, _) = watch::channel(false);
        Self {
            context: context.clone(),
            progress,
            outstanding: Mutex::new(0),
        }
    }

    fn begin_load(&self) -> LoadGuard<'_> {
        let mut outstanding = self.outstanding.lock();
        *outstanding += 1;
        self.progress.send_replace(true);
        LoadGuard { manager: self }
    }

    /// True while any history request is outstanding.
    pub fn progress(&self) -> watch::Receiver<bool> {
        self.progress.subscribe()
    }

    /// Fetch the history, latest event first. Bookkeeping events are left
    /// out unless `show_all` is set.
    pub async fn load_history(&self, show_all: bool) -> Result<Vec<HistoryEvent>, BridgeError> {
        let guard = self.begin_load();
        let result = self
            .context
            .api()
            .request_as::<HistoryResponse>("getHistory", None)
            .await;
        drop(guard);

        let events = result?.into_display_order(show_all);
        debug!(events = events.len(), show_all = show_all, "History loaded");
        Ok(events)
    }
}
