//! Single-flight refresh of a piece of wallet state.
//!
//! At most one request is outstanding per slot; `refresh()` while one is in
//! flight does nothing. A reconnect bumps the slot's epoch so a reply that
//! belongs to the old link cannot clear the flag of the new request.

use crate::context::WalletContext;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use wallet_telemetry::STALE_RESPONSES_DROPPED;

/// Observable state of a refreshed value.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    NotLoaded,
    Loaded(T),
    /// Last refresh failed; carries the diagnostic.
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

struct Slot {
    in_flight: bool,
    epoch: u64,
}

pub(crate) struct Refresher<T> {
    operation: &'static str,
    context: WalletContext,
    decode: fn(Value) -> Result<T, serde_json::Error>,
    slot: Arc<Mutex<Slot>>,
    state: Arc<watch::Sender<LoadState<T>>>,
}

impl<T> Refresher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        operation: &'static str,
        context: WalletContext,
        decode: fn(Value) -> Result<T, serde_json::Error>,
    ) -> Self {
        let (state, _) = watch::channel(LoadState::NotLoaded);
        Self {
            operation,
            context,
            decode,
            slot: Arc::new(Mutex::new(Slot {
                in_flight: false,
                epoch: 0,
            })),
            state: Arc::new(state),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LoadState<T>> {
        self.state.subscribe()
    }

    pub(crate) fn current(&self) -> LoadState<T> {
        self.state.borrow().clone()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.slot.lock().in_flight
    }

    /// Issue the request unless one is already outstanding.
    ///
    /// Returns true if a request was sent.
    pub(crate) fn refresh(&self) -> bool {
        let epoch = {
            let mut slot = self.slot.lock();
            if slot.in_flight {
                debug!(operation = self.operation, "Refresh already in flight");
                return false;
            }
            slot.in_flight = true;
            slot.epoch
        };

        let reply = self.context.send_request(self.operation, None);
        let operation = self.operation;
        let decode = self.decode;
        let slot = Arc::clone(&self.slot);
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let next = match reply.await {
                Ok(value) => match decode(value) {
                    Ok(decoded) => LoadState::Loaded(decoded),
                    Err(e) => LoadState::Failed(format!("malformed {operation} reply: {e}")),
                },
                Err(e) => LoadState::Failed(e.diagnostic()),
            };

            let mut slot = slot.lock();
            if slot.epoch != epoch {
                STALE_RESPONSES_DROPPED.with_label_values(&[operation]).inc();
                debug!(operation = operation, "Dropping reply from a previous link");
                return;
            }
            slot.in_flight = false;
            state.send_replace(next);
        });
        true
    }

    /// Forget any outstanding request and refresh on the new link.
    pub(crate) fn on_reconnect(&self) -> bool {
        {
            let mut slot = self.slot.lock();
            slot.epoch += 1;
            slot.in_flight = false;
        }
        self.refresh()
    }

    /// Back to `NotLoaded`; an outstanding reply is ignored.
    pub(crate) fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.epoch += 1;
        slot.in_flight = false;
        self.state.send_replace(LoadState::NotLoaded);
    }
}
