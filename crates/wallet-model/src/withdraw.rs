//! Withdrawal flow.
//!
//! ```text
//! Idle ──get_withdrawal_info──► Loading ──► TermsReviewRequired ──accept ToS──► Loading
//!                                  │                                             │
//!                                  └──────────────► DetailsReady ◄───────────────┘
//!                                                       │ accept_withdrawal
//!                                                       ▼
//!                                                   Confirming ──► Succeeded
//! any step: backend error ──► Failed        cancel_current_withdraw ──► Idle
//! ```

use crate::context::WalletContext;
use crate::error::ModelError;
use crate::flow::Flow;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wallet_backend::{BridgeError, PendingReply};
use wallet_types::{Amount, WithdrawDetails};

/// Etag sent back when the exchange did not report one.
const UNKNOWN_TOS_ETAG: &str = "undefined";

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawStatus {
    Idle,
    Loading(String),
    TermsReviewRequired {
        uri: String,
        exchange: String,
        tos_text: String,
        tos_etag: String,
    },
    DetailsReady {
        uri: String,
        amount: Amount,
        exchange: String,
    },
    Confirming(String),
    Succeeded,
    Failed(String),
}

pub struct WithdrawManager {
    context: WalletContext,
    flow: Arc<Flow<WithdrawStatus>>,
    test_withdrawal: Arc<watch::Sender<bool>>,
}

impl WithdrawManager {
    pub fn new(context: &WalletContext) -> Self {
        let (test_withdrawal, _) = watch::channel(false);
        Self {
            context: context.clone(),
            flow: Arc::new(Flow::new("withdraw", WithdrawStatus::Idle)),
            test_withdrawal: Arc::new(test_withdrawal),
        }
    }

    pub fn status(&self) -> watch::Receiver<WithdrawStatus> {
        self.flow.subscribe()
    }

    pub fn current(&self) -> WithdrawStatus {
        self.flow.current()
    }

    /// Look up what withdrawing from `uri` would do.
    ///
    /// Supersedes any withdrawal in progress.
    pub fn get_withdrawal_info(&self, uri: impl Into<String>) -> JoinHandle<()> {
        let uri = uri.into();
        let generation = self.flow.restart(WithdrawStatus::Loading(uri.clone()));
        debug!(uri = %uri, generation = generation, "Loading withdrawal details");

        let first = details_request(&self.context, &uri, None);
        let context = self.context.clone();
        let flow = Arc::clone(&self.flow);
        tokio::spawn(load_details(context, flow, generation, uri, None, first))
    }

    /// Confirm a withdrawal of `uri` through `exchange`. The details for
    /// `uri` must have been loaded.
    pub fn accept_withdrawal(
        &self,
        uri: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Result<JoinHandle<()>, ModelError> {
        let uri = uri.into();
        let exchange = exchange.into();
        let generation = self
            .flow
            .restart_from(|status| match status {
                WithdrawStatus::DetailsReady { uri: ready, .. } if *ready == uri => {
                    Some(WithdrawStatus::Confirming(uri.clone()))
                }
                _ => None,
            })
            .ok_or_else(|| ModelError::WithdrawalNotReady(uri.clone()))?;
        info!(uri = %uri, exchange = %exchange, "Accepting withdrawal");

        let reply = self.context.send_request(
            "acceptWithdrawal",
            Some(json!({"talerWithdrawUri": uri, "selectedExchange": exchange})),
        );
        let flow = Arc::clone(&self.flow);
        Ok(tokio::spawn(async move {
            let outcome = reply.await;
            flow.apply(generation, |status| match status {
                WithdrawStatus::Confirming(current) if *current == uri => Some(match outcome {
                    Ok(_) => WithdrawStatus::Succeeded,
                    Err(e) => WithdrawStatus::Failed(e.diagnostic()),
                }),
                _ => None,
            });
        }))
    }

    /// Accept the terms of service under review, then re-check the details.
    pub fn accept_current_terms_of_service(&self) -> Result<JoinHandle<()>, ModelError> {
        let WithdrawStatus::TermsReviewRequired {
            uri,
            exchange,
            tos_etag,
            ..
        } = self.flow.current()
        else {
            return Err(ModelError::NotReviewingTerms);
        };

        let generation = self.flow.restart(WithdrawStatus::Loading(uri.clone()));
        info!(exchange = %exchange, etag = %tos_etag, "Accepting exchange terms of service");

        let accept = self.context.send_request(
            "acceptExchangeTermsOfService",
            Some(json!({"exchangeBaseUrl": exchange, "etag": tos_etag})),
        );
        let context = self.context.clone();
        let flow = Arc::clone(&self.flow);
        Ok(tokio::spawn(async move {
            if let Err(e) = accept.await {
                fail_loading(&flow, generation, &uri, &e);
                return;
            }
            if !flow.is_current(generation) {
                return;
            }
            let reply = details_request(&context, &uri, Some(&exchange));
            load_details(context, flow, generation, uri, Some(exchange), reply).await;
        }))
    }

    /// Abandon the current withdrawal. Replies still in flight are ignored.
    pub fn cancel_current_withdraw(&self) {
        let generation = self.flow.restart(WithdrawStatus::Idle);
        debug!(generation = generation, "Withdrawal cancelled");
    }

    /// Withdraw demo currency from the test bank.
    pub fn withdraw_test_kudos(&self) -> JoinHandle<()> {
        self.test_withdrawal.send_replace(true);
        let reply = self.context.send_request("withdrawTestkudos", None);
        let flag = Arc::clone(&self.test_withdrawal);
        tokio::spawn(async move {
            if let Err(e) = reply.await {
                warn!(error = %e, "Test withdrawal failed");
            }
            flag.send_replace(false);
        })
    }

    pub fn test_withdrawal_in_progress(&self) -> watch::Receiver<bool> {
        self.test_withdrawal.subscribe()
    }

    pub(crate) fn clear_test_withdrawal(&self) {
        self.test_withdrawal.send_replace(false);
    }
}

fn details_request(
    context: &WalletContext,
    uri: &str,
    exchange: Option<&str>,
) -> PendingReply {
    let mut args = json!({"talerWithdrawUri": uri});
    if let Some(exchange) = exchange {
        args["selectedExchange"] = Value::String(exchange.to_string());
    }
    context.send_request("getWithdrawDetailsForUri", Some(args))
}

/// Drive `Loading(uri)` to its next state. Re-queries once with the
/// suggested exchange when the engine did not pick one.
async fn load_details(
    context: WalletContext,
    flow: Arc<Flow<WithdrawStatus>>,
    generation: u64,
    uri: String,
    mut selected: Option<String>,
    mut reply: PendingReply,
) {
    loop {
        let details: WithdrawDetails = match reply.decode().await {
            Ok(details) => details,
            Err(e) => {
                fail_loading(&flow, generation, &uri, &e);
                return;
            }
        };

        let bank = details.bank_withdraw_details;
        let Some(exchange_details) = details.exchange_withdraw_details else {
            match bank.suggested_exchange {
                Some(suggested) if selected.is_none() => {
                    if !flow.is_current(generation) {
                        return;
                    }
                    debug!(exchange = %suggested, "Re-querying with suggested exchange");
                    reply = details_request(&context, &uri, Some(&suggested));
                    selected = Some(suggested);
                    continue;
                }
                _ => {
                    apply_loading(&flow, generation, &uri, || {
                        WithdrawStatus::Failed("no exchange available for this withdrawal".into())
                    });
                    return;
                }
            }
        };

        let info = exchange_details.exchange_info;
        let next = if exchange_details.terms_of_service_accepted {
            let exchange = selected
                .or(bank.suggested_exchange)
                .unwrap_or(info.base_url);
            WithdrawStatus::DetailsReady {
                uri: uri.clone(),
                amount: bank.amount,
                exchange,
            }
        } else {
            WithdrawStatus::TermsReviewRequired {
                uri: uri.clone(),
                exchange: info.base_url,
                tos_text: info.terms_of_service_text.unwrap_or_default(),
                tos_etag: info
                    .terms_of_service_last_etag
                    .unwrap_or_else(|| UNKNOWN_TOS_ETAG.to_string()),
            }
        };
        apply_loading(&flow, generation, &uri, || next);
        return;
    }
}

/// Apply `next` only while still `Loading(uri)` in `generation`.
fn apply_loading(
    flow: &Flow<WithdrawStatus>,
    generation: u64,
    uri: &str,
    next: impl FnOnce() -> WithdrawStatus,
) -> bool {
    flow.apply(generation, |status| match status {
        WithdrawStatus::Loading(current) if current == uri => Some(next()),
        _ => None,
    })
}

fn fail_loading(flow: &Flow<WithdrawStatus>, generation: u64, uri: &str, error: &BridgeError) {
    apply_loading(flow, generation, uri, || WithdrawStatus::Failed(error.diagnostic()));
}
