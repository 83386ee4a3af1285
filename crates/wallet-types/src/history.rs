//! Wallet history events returned by `getHistory`.
//!
//! Events are tagged by their `type` field. Tags this client does not know
//! decode to [`HistoryEvent::Unknown`] so one new event kind never breaks the
//! whole history.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Engine timestamp in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "t_ms")]
    pub ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReserveType {
    Manual,
    TalerBankWithdraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveCreationDetail {
    #[serde(rename = "type")]
    pub reserve_type: ReserveType,
    #[serde(default)]
    pub bank_url: Option<String>,
}

/// Condensed information about a reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveShortInfo {
    pub exchange_base_url: String,
    pub reserve_pub: String,
    pub reserve_creation_detail: ReserveCreationDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshReason {
    Manual,
    Pay,
    Refund,
    AbortPay,
    Recoup,
    BackupRestored,
}

/// Where withdrawn coins came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WithdrawalSource {
    Reserve {
        #[serde(rename = "reservePub")]
        reserve_pub: String,
    },
    Tip {
        #[serde(rename = "tipId")]
        tip_id: String,
    },
}

/// Condensed information about an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderShortInfo {
    pub proposal_id: String,
    pub order_id: String,
    pub merchant_base_url: String,
    pub amount: Amount,
    pub summary: String,
}

/// A transaction on a reserve's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReserveTransaction {
    #[serde(rename = "DEPOSIT")]
    Deposit(ReserveDepositTransaction),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveDepositTransaction {
    pub amount: Amount,
    pub sender_account_url: String,
    pub wire_reference: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeAddedEvent {
    pub timestamp: Timestamp,
    pub exchange_base_url: String,
    pub built_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeUpdatedEvent {
    pub timestamp: Timestamp,
    pub exchange_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveBalanceUpdatedEvent {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub new_history_transactions: Vec<ReserveTransaction>,
    pub reserve_short_info: ReserveShortInfo,
    /// Amount currently left in the reserve.
    pub amount_reserve_balance: Amount,
    /// Amount expected in the reserve, counting ongoing withdrawals.
    pub amount_expected: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawnEvent {
    pub timestamp: Timestamp,
    pub exchange_base_url: String,
    pub withdraw_session_id: String,
    pub withdrawal_source: WithdrawalSource,
    /// Subtracted from the reserve.
    pub amount_withdrawn_raw: Amount,
    /// Added to the wallet balance.
    pub amount_withdrawn_effective: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub timestamp: Timestamp,
    pub order_short_info: OrderShortInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSentEvent {
    pub timestamp: Timestamp,
    pub order_short_info: OrderShortInfo,
    /// Payment was already sent before, possibly under another session.
    pub replay: bool,
    pub num_coins: u32,
    pub amount_paid_with_fees: Amount,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedEvent {
    pub timestamp: Timestamp,
    pub amount_refreshed_effective: Amount,
    pub amount_refreshed_raw: Amount,
    pub refresh_reason: RefreshReason,
    pub num_input_coins: u32,
    pub num_refreshed_input_coins: u32,
    pub num_output_coins: u32,
    pub refresh_group_id: String,
}

/// One entry of the wallet history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HistoryEvent {
    ExchangeAdded(ExchangeAddedEvent),
    ExchangeUpdated(ExchangeUpdatedEvent),
    ReserveBalanceUpdated(ReserveBalanceUpdatedEvent),
    Withdrawn(WithdrawnEvent),
    OrderAccepted(OrderEvent),
    OrderRefused(OrderEvent),
    PaymentSent(PaymentSentEvent),
    Refreshed(RefreshedEvent),
    #[serde(other)]
    Unknown,
}

impl HistoryEvent {
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            HistoryEvent::ExchangeAdded(e) => Some(e.timestamp),
            HistoryEvent::ExchangeUpdated(e) => Some(e.timestamp),
            HistoryEvent::ReserveBalanceUpdated(e) => Some(e.timestamp),
            HistoryEvent::Withdrawn(e) => Some(e.timestamp),
            HistoryEvent::OrderAccepted(e) | HistoryEvent::OrderRefused(e) => Some(e.timestamp),
            HistoryEvent::PaymentSent(e) => Some(e.timestamp),
            HistoryEvent::Refreshed(e) => Some(e.timestamp),
            HistoryEvent::Unknown => None,
        }
    }

    /// Whether the event is shown in the default (non-"show all") history.
    ///
    /// Exchange and reserve bookkeeping is internal; money movements and
    /// merchant interactions are user-visible.
    pub fn show_to_user(&self) -> bool {
        match self {
            HistoryEvent::ExchangeAdded(_)
            | HistoryEvent::ExchangeUpdated(_)
            | HistoryEvent::ReserveBalanceUpdated(_)
            | HistoryEvent::Unknown => false,
            HistoryEvent::Withdrawn(_)
            | HistoryEvent::OrderAccepted(_)
            | HistoryEvent::OrderRefused(_)
            | HistoryEvent::PaymentSent(_)
            | HistoryEvent::Refreshed(_) => true,
        }
    }
}

/// Reply payload of `getHistory`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl HistoryResponse {
    /// Latest event first, optionally restricted to user-visible events.
    pub fn into_display_order(self, show_all: bool) -> Vec<HistoryEvent> {
        self.history
            .into_iter()
            .rev()
            .filter(|event| show_all || event.show_to_user())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TIMESTAMP: i64 = 1_575_982_863_000;
    const EXCHANGE: &str = "https://exchange.test.taler.net/";
    const RESERVE_PUB: &str = "BRT2P0YMQSD5F48V9XHVNH73ZTS6EZC0KCQCPGPZQWTSQB77615G";

    fn order_info() -> serde_json::Value {
        json!({
            "amount": "KUDOS:0.5",
            "orderId": "2019.364-01RAQ68DQ7AWR",
            "merchantBaseUrl": "https://backend.demo.taler.net/public/instances/FSF/",
            "proposalId": "EP5MH4R5C9RMNA06YS1QGEJ3EY682PY8R1SGRFRP74EV735N3ATG",
            "summary": "Essay: Foreword"
        })
    }

    #[test]
    fn test_exchange_added_event() {
        let event: HistoryEvent = serde_json::from_value(json!({
            "type": "exchange-added",
            "eventId": "exchange-added;111",
            "builtIn": true,
            "exchangeBaseUrl": EXCHANGE,
            "timestamp": {"t_ms": TIMESTAMP}
        }))
        .unwrap();
        match &event {
            HistoryEvent::ExchangeAdded(e) => {
                assert!(e.built_in);
                assert_eq!(e.exchange_base_url, EXCHANGE);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(event.timestamp(), Some(Timestamp { ms: TIMESTAMP }));
        assert!(!event.show_to_user());
    }

    #[test]
    fn test_reserve_balance_updated_event() {
        let event: HistoryEvent = serde_json::from_value(json!({
            "type": "reserve-balance-updated",
            "amountExpected": "TESTKUDOS:23",
            "amountReserveBalance": "TESTKUDOS:10",
            "timestamp": {"t_ms": TIMESTAMP},
            "newHistoryTransactions": [{
                "amount": "TESTKUDOS:10",
                "sender_account_url": "payto://x-taler-bank/bank.test.taler.net/894",
                "timestamp": {"t_ms": TIMESTAMP},
                "wire_reference": "00000000004TR",
                "type": "DEPOSIT"
            }],
            "reserveShortInfo": {
                "exchangeBaseUrl": EXCHANGE,
                "reserveCreationDetail": {"type": "manual"},
                "reservePub": RESERVE_PUB
            }
        }))
        .unwrap();
        let HistoryEvent::ReserveBalanceUpdated(e) = event else {
            panic!("wrong variant");
        };
        assert_eq!(e.amount_expected.to_string(), "TESTKUDOS:23");
        assert_eq!(e.reserve_short_info.reserve_creation_detail.reserve_type, ReserveType::Manual);
        assert!(matches!(
            &e.new_history_transactions[0],
            ReserveTransaction::Deposit(d) if d.wire_reference == "00000000004TR"
        ));
    }

    #[test]
    fn test_withdrawn_event() {
        let event: HistoryEvent = serde_json::from_value(json!({
            "type": "withdrawn",
            "withdrawSessionId": "974FT7JDNR20EQKNR21G1HV9PB6T5AZHYHX9NHR51Q30ZK3T10S0",
            "amountWithdrawnEffective": "TESTKUDOS:9.8",
            "amountWithdrawnRaw": "TESTKUDOS:10",
            "exchangeBaseUrl": EXCHANGE,
            "timestamp": {"t_ms": TIMESTAMP},
            "withdrawalSource": {"type": "reserve", "reservePub": RESERVE_PUB}
        }))
        .unwrap();
        let HistoryEvent::Withdrawn(e) = &event else {
            panic!("wrong variant");
        };
        assert_eq!(e.amount_withdrawn_effective.to_string(), "TESTKUDOS:9.8");
        assert_eq!(
            e.withdrawal_source,
            WithdrawalSource::Reserve {
                reserve_pub: RESERVE_PUB.to_string()
            }
        );
        assert!(event.show_to_user());
    }

    #[test]
    fn test_payment_sent_and_refreshed_events() {
        let paid: HistoryEvent = serde_json::from_value(json!({
            "type": "payment-sent",
            "orderShortInfo": order_info(),
            "replay": false,
            "numCoins": 6,
            "amountPaidWithFees": "KUDOS:0.6",
            "timestamp": {"t_ms": TIMESTAMP}
        }))
        .unwrap();
        assert!(matches!(&paid, HistoryEvent::PaymentSent(e) if e.session_id.is_none() && e.num_coins == 6));

        let refreshed: HistoryEvent = serde_json::from_value(json!({
            "type": "refreshed",
            "amountRefreshedEffective": "KUDOS:0",
            "amountRefreshedRaw": "KUDOS:1",
            "refreshReason": "abort-pay",
            "numInputCoins": 1,
            "numRefreshedInputCoins": 1,
            "numOutputCoins": 0,
            "refreshGroupId": "Q3Q",
            "timestamp": {"t_ms": TIMESTAMP}
        }))
        .unwrap();
        assert!(matches!(&refreshed, HistoryEvent::Refreshed(e) if e.refresh_reason == RefreshReason::AbortPay));
    }

    #[test]
    fn test_unknown_event_type() {
        let event: HistoryEvent = serde_json::from_value(json!({
            "type": "tip-accepted",
            "timestamp": {"t_ms": TIMESTAMP}
        }))
        .unwrap();
        assert_eq!(event, HistoryEvent::Unknown);
        assert_eq!(event.timestamp(), None);
    }

    #[test]
    fn test_display_order_latest_first_and_filtered() {
        let response: HistoryResponse = serde_json::from_value(json!({
            "history": [
                {"type": "exchange-added", "builtIn": true, "exchangeBaseUrl": EXCHANGE, "timestamp": {"t_ms": 1}},
                {"type": "order-accepted", "orderShortInfo": order_info(), "timestamp": {"t_ms": 2}},
                {"type": "order-refused", "orderShortInfo": order_info(), "timestamp": {"t_ms": 3}}
            ]
        }))
        .unwrap();

        let visible = response.clone().into_display_order(false);
        let stamps: Vec<_> = visible.iter().filter_map(|e| e.timestamp()).map(|t| t.ms).collect();
        assert_eq!(stamps, vec![3, 2]);

        let all = response.into_display_order(true);
        assert_eq!(all.len(), 3);
        assert!(matches!(all[2], HistoryEvent::ExchangeAdded(_)));
    }
}
