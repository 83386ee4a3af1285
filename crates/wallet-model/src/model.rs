//! The wallet model facade.

use crate::balance::BalanceManager;
use crate::context::WalletContext;
use crate::error::ModelError;
use crate::history::HistoryManager;
use crate::payment::PaymentManager;
use crate::pending::PendingOperationsManager;
use crate::uri::{parse_taler_uri, UriAction};
use crate::withdraw::WithdrawManager;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use wallet_backend::{ConnectionState, WalletBackendApi};

/// Every piece of wallet state a front end shows, built on one backend
/// client.
pub struct WalletModel {
    context: WalletContext,
    balances: Arc<BalanceManager>,
    pending: Arc<PendingOperationsManager>,
    withdraw: WithdrawManager,
    payment: PaymentManager,
    history: HistoryManager,
}

impl WalletModel {
    /// Build all managers. Must be called within a Tokio runtime.
    pub fn new(api: Arc<WalletBackendApi>) -> Self {
        let context = WalletContext::new(api);
        let model = Self {
            balances: BalanceManager::new(&context),
            pending: PendingOperationsManager::new(&context),
            withdraw: WithdrawManager::new(&context),
            payment: PaymentManager::new(&context),
            history: HistoryManager::new(&context),
            context,
        };

        // Managers refresh on BackendConnected; a link that came up before
        // they subscribed needs an explicit first load.
        if model.context.api().connection_state() == ConnectionState::Connected {
            model.balances.refresh();
            model.pending.refresh();
        }
        model
    }

    pub fn context(&self) -> &WalletContext {
        &self.context
    }

    pub fn balances(&self) -> &Arc<BalanceManager> {
        &self.balances
    }

    pub fn pending_operations(&self) -> &Arc<PendingOperationsManager> {
        &self.pending
    }

    pub fn withdraw(&self) -> &WithdrawManager {
        &self.withdraw
    }

    pub fn payment(&self) -> &PaymentManager {
        &self.payment
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Wipe the wallet database. Local state goes back to its initial
    /// values without waiting for the engine.
    pub fn dangerously_reset(&self) {
        warn!("Resetting wallet database");
        self.context.send_detached("reset", None);
        self.withdraw.clear_test_withdrawal();
        self.balances.reset();
    }

    pub fn start_tunnel(&self) {
        self.context.send_detached("startTunnel", None);
    }

    pub fn stop_tunnel(&self) {
        self.context.send_detached("stopTunnel", None);
    }

    /// Hand the engine the response to a tunnelled HTTP request.
    pub fn tunnel_response(&self, response: &str) -> Result<(), ModelError> {
        let payload: Value =
            serde_json::from_str(response).map_err(|e| ModelError::InvalidJson(e.to_string()))?;
        self.context.send_detached("tunnelResponse", Some(payload));
        Ok(())
    }

    pub fn retry_pending_now(&self) {
        self.pending.retry_pending_now();
    }

    /// Route a `taler://` deep link to the flow that handles it.
    pub fn open_uri(&self, uri: &str) -> Result<UriAction, ModelError> {
        let action = parse_taler_uri(uri)?;
        match &action {
            UriAction::Payment(uri) => {
                info!(uri = %uri, "Opening payment link");
                drop(self.payment.prepare_pay(uri.as_str()));
            }
            UriAction::Withdrawal(uri) => {
                info!(uri = %uri, "Opening withdrawal link");
                drop(self.withdraw.get_withdrawal_info(uri.as_str()));
            }
            UriAction::RefundUnsupported(uri) => {
                warn!(uri = %uri, "Refunds are not yet implemented");
            }
        }
        Ok(action)
    }

    pub async fn shutdown(&self) {
        self.context.api().shutdown().await;
    }
}
