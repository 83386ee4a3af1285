//! Payment flow.

use crate::context::WalletContext;
use crate::flow::Flow;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use wallet_types::{Amount, ContractTerms};

#[derive(Debug, Clone, PartialEq)]
pub enum PayStatus {
    None,
    Loading,
    Prepared {
        contract_terms: ContractTerms,
        proposal_id: String,
        total_fees: Amount,
    },
    InsufficientBalance(ContractTerms),
    AlreadyPaid(ContractTerms),
    Error(String),
    Success,
}

impl PayStatus {
    /// Whether the user can confirm this payment.
    pub fn can_confirm(&self) -> bool {
        matches!(self, PayStatus::Prepared { .. })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreparePayResponse {
    status: String,
    #[serde(default)]
    contract_terms_raw: Option<Value>,
    #[serde(default)]
    proposal_id: Option<String>,
    #[serde(default)]
    total_fees: Option<Amount>,
}

/// Map a `preparePay` reply to a status. Total: anything unexpected
/// becomes `PayStatus::Error`.
pub fn pay_status_from_reply(reply: Value) -> PayStatus {
    let response: PreparePayResponse = match serde_json::from_value(reply) {
        Ok(response) => response,
        Err(e) => return PayStatus::Error(format!("malformed preparePay reply: {e}")),
    };

    let contract_terms = || -> Result<ContractTerms, String> {
        let raw = response
            .contract_terms_raw
            .as_ref()
            .ok_or_else(|| "preparePay reply has no contract terms".to_string())?;
        ContractTerms::from_raw(raw).map_err(|e| e.to_string())
    };

    let status = match response.status.as_str() {
        "payment-possible" => contract_terms().and_then(|contract_terms| {
            let proposal_id = response
                .proposal_id
                .clone()
                .ok_or("preparePay reply has no proposalId")?;
            let total_fees = response
                .total_fees
                .clone()
                .ok_or("preparePay reply has no totalFees")?;
            Ok(PayStatus::Prepared {
                contract_terms,
                proposal_id,
                total_fees,
            })
        }),
        "paid" => contract_terms().map(PayStatus::AlreadyPaid),
        "insufficient-balance" => contract_terms().map(PayStatus::InsufficientBalance),
        "error" => Ok(PayStatus::Error("wallet reported a payment error".into())),
        _ => Ok(PayStatus::Error("unknown status".into())),
    };
    status.unwrap_or_else(PayStatus::Error)
}

pub struct PaymentManager {
    context: WalletContext,
    flow: Arc<Flow<PayStatus>>,
    details_shown: watch::Sender<bool>,
}

impl PaymentManager {
    pub fn new(context: &WalletContext) -> Self {
        let (details_shown, _) = watch::channel(false);
        Self {
            context: context.clone(),
            flow: Arc::new(Flow::new("payment", PayStatus::None)),
            details_shown,
        }
    }

    pub fn status(&self) -> watch::Receiver<PayStatus> {
        self.flow.subscribe()
    }

    pub fn current(&self) -> PayStatus {
        self.flow.current()
    }

    /// Ask the wallet whether the payment at `url` can be made.
    pub fn prepare_pay(&self, url: impl Into<String>) -> JoinHandle<()> {
        let url = url.into();
        let generation = self.flow.restart(PayStatus::Loading);
        self.details_shown.send_replace(false);
        debug!(url = %url, generation = generation, "Preparing payment");

        let reply = self.context.send_request("preparePay", Some(json!({"url": url})));
        let flow = Arc::clone(&self.flow);
        tokio::spawn(async move {
            let next = match reply.await {
                Ok(value) => pay_status_from_reply(value),
                Err(e) => PayStatus::Error(e.diagnostic()),
            };
            flow.apply(generation, |status| {
                matches!(status, PayStatus::Loading).then_some(next)
            });
        })
    }

    pub fn confirm_pay(&self, proposal_id: impl Into<String>) -> JoinHandle<()> {
        let proposal_id = proposal_id.into();
        info!(proposal_id = %proposal_id, "Confirming payment");
        let generation = self.flow.generation();
        let reply = self
            .context
            .send_request("confirmPay", Some(json!({"proposalId": proposal_id})));
        let flow = Arc::clone(&self.flow);
        tokio::spawn(async move {
            let next = match reply.await {
                Ok(_) => PayStatus::Success,
                Err(e) => PayStatus::Error(e.diagnostic()),
            };
            flow.apply(generation, |_| Some(next));
        })
    }

    pub fn abort_proposal(&self, proposal_id: impl Into<String>) -> JoinHandle<()> {
        let proposal_id = proposal_id.into();
        info!(proposal_id = %proposal_id, "Aborting proposal");
        let generation = self.flow.generation();
        let reply = self
            .context
            .send_request("abortProposal", Some(json!({"proposalId": proposal_id})));
        let flow = Arc::clone(&self.flow);
        tokio::spawn(async move {
            let next = match reply.await {
                Ok(_) => PayStatus::None,
                Err(e) => PayStatus::Error(e.diagnostic()),
            };
            flow.apply(generation, |_| Some(next));
        })
    }

    /// Back to `None`; replies still in flight are ignored.
    pub fn reset_pay_status(&self) {
        self.flow.restart(PayStatus::None);
    }

    pub fn details_shown(&self) -> watch::Receiver<bool> {
        self.details_shown.subscribe()
    }

    pub fn toggle_details_shown(&self) {
        self.details_shown.send_modify(|shown| *shown = !*shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connected, settle, wait_until};

    fn contract() -> Value {
        json!({"summary": "Coffee", "amount": "KUDOS:1.5", "products": []})
    }

    #[test]
    fn test_status_mapping_is_total() {
        let raw = contract().to_string();
        let cases = [
            (
                json!({"status": "payment-possible", "contractTermsRaw": raw,
                       "proposalId": "p-1", "totalFees": "KUDOS:0.01"}),
                "prepared",
            ),
            (json!({"status": "paid", "contractTermsRaw": raw}), "paid"),
            (
                json!({"status": "insufficient-balance", "contractTermsRaw": raw}),
                "insufficient",
            ),
            (json!({"status": "error"}), "error"),
            (json!({"status": "refund-pending"}), "error"),
            (json!({"noStatus": true}), "error"),
            (json!("garbage"), "error"),
        ];

        for (reply, expected) in cases {
            let status = pay_status_from_reply(reply.clone());
            let kind = match status {
                PayStatus::Prepared { .. } => "prepared",
                PayStatus::AlreadyPaid(_) => "paid",
                PayStatus::InsufficientBalance(_) => "insufficient",
                PayStatus::Error(_) => "error",
                other => panic!("unexpected {other:?} for {reply}"),
            };
            assert_eq!(kind, expected, "reply {reply}");
        }
    }

    #[test]
    fn test_unknown_status_message() {
        assert_eq!(
            pay_status_from_reply(json!({"status": "something-new"})),
            PayStatus::Error("unknown status".into())
        );
    }

    #[test]
    fn test_prepared_fields() {
        let status = pay_status_from_reply(json!({
            "status": "payment-possible",
            "contractTermsRaw": contract(),
            "proposalId": "p-9",
            "totalFees": {"currency": "KUDOS", "value": 0, "fraction": 1000000}
        }));
        match status {
            PayStatus::Prepared {
                contract_terms,
                proposal_id,
                total_fees,
            } => {
                assert_eq!(contract_terms.summary, "Coffee");
                assert_eq!(proposal_id, "p-9");
                assert_eq!(total_fees.to_string(), "KUDOS:0.01");
            }
            other => panic!("expected prepared, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_contract_terms_become_error() {
        let status = pay_status_from_reply(json!({
            "status": "paid",
            "contractTermsRaw": "{not json"
        }));
        assert!(matches!(status, PayStatus::Error(_)));
    }

    #[test]
    fn test_only_prepared_can_confirm() {
        let terms: ContractTerms = serde_json::from_value(contract()).unwrap();
        assert!(PayStatus::Prepared {
            contract_terms: terms.clone(),
            proposal_id: "p".into(),
            total_fees: "KUDOS:0".parse().unwrap(),
        }
        .can_confirm());
        assert!(!PayStatus::InsufficientBalance(terms.clone()).can_confirm());
        assert!(!PayStatus::AlreadyPaid(terms).can_confirm());
        assert!(!PayStatus::Loading.can_confirm());
        assert!(!PayStatus::Error("x".into()).can_confirm());
    }

    const PAY_URL: &str = "taler://pay/shop.test/-/-/order-7";

    fn insufficient() -> Value {
        json!({"status": "insufficient-balance", "contractTermsRaw": contract().to_string()})
    }

    #[tokio::test]
    async fn test_insufficient_balance_cannot_confirm() {
        let mut harness = connected().await;
        let manager = PaymentManager::new(&harness.context);
        let mut status = manager.status();

        manager.prepare_pay(PAY_URL);
        assert_eq!(manager.current(), PayStatus::Loading);
        let command = harness.expect("preparePay").await;
        assert_eq!(command.args, json!({"url": PAY_URL}));
        harness.peer.reply(command.id, "preparePay", insufficient());

        let result = wait_until(&mut status, |s| !matches!(s, PayStatus::Loading)).await;
        let PayStatus::InsufficientBalance(terms) = &result else {
            panic!("unexpected {result:?}");
        };
        assert_eq!(terms.summary, "Coffee");
        assert!(!result.can_confirm());
    }

    #[tokio::test]
    async fn test_stale_prepare_is_dropped() {
        let mut harness = connected().await;
        let manager = PaymentManager::new(&harness.context);

        manager.prepare_pay(PAY_URL);
        let first = harness.expect("preparePay").await;
        let second_task = manager.prepare_pay("taler://pay/shop.test/-/-/order-8");
        let second = harness.expect("preparePay").await;

        harness.peer.reply_error(first.id, "preparePay", json!({"message": "too late"}));
        settle().await;
        assert_eq!(manager.current(), PayStatus::Loading);

        harness.peer.reply(
            second.id,
            "preparePay",
            json!({"status": "paid", "contractTermsRaw": contract()}),
        );
        second_task.await.unwrap();
        assert!(matches!(manager.current(), PayStatus::AlreadyPaid(_)));
    }

    #[tokio::test]
    async fn test_confirm_success_and_error() {
        let mut harness = connected().await;
        let manager = PaymentManager::new(&harness.context);

        let task = manager.confirm_pay("p-1");
        let command = harness.expect("confirmPay").await;
        assert_eq!(command.args, json!({"proposalId": "p-1"}));
        harness.peer.reply(command.id, "confirmPay", json!({}));
        task.await.unwrap();
        assert_eq!(manager.current(), PayStatus::Success);

        let task = manager.confirm_pay("p-2");
        let command = harness.expect("confirmPay").await;
        harness
            .peer
            .reply_error(command.id, "confirmPay", json!({"message": "coins spent"}));
        task.await.unwrap();
        match manager.current() {
            PayStatus::Error(message) => assert!(message.contains("coins spent")),
            status => panic!("unexpected {status:?}"),
        }
    }

    #[tokio::test]
    async fn test_abort_and_reset() {
        let mut harness = connected().await;
        let manager = PaymentManager::new(&harness.context);

        manager.prepare_pay(PAY_URL);
        let prepare = harness.expect("preparePay").await;
        harness.peer.reply(prepare.id, "preparePay", insufficient());
        let mut status = manager.status();
        wait_until(&mut status, |s| matches!(s, PayStatus::InsufficientBalance(_))).await;

        let task = manager.abort_proposal("p-1");
        let abort = harness.expect("abortProposal").await;
        assert_eq!(abort.args, json!({"proposalId": "p-1"}));
        harness.peer.reply(abort.id, "abortProposal", json!({}));
        task.await.unwrap();
        assert_eq!(manager.current(), PayStatus::None);

        manager.prepare_pay(PAY_URL);
        let late = harness.expect("preparePay").await;
        manager.reset_pay_status();
        harness.peer.reply(late.id, "preparePay", insufficient());
        settle().await;
        assert_eq!(manager.current(), PayStatus::None);
    }

    #[tokio::test]
    async fn test_details_toggle_resets_on_prepare() {
        let harness = connected().await;
        let manager = PaymentManager::new(&harness.context);
        let shown = manager.details_shown();

        manager.toggle_details_shown();
        assert!(*shown.borrow());
        manager.toggle_details_shown();
        assert!(!*shown.borrow());

        manager.toggle_details_shown();
        manager.prepare_pay(PAY_URL);
        assert!(!*shown.borrow());
    }
}
