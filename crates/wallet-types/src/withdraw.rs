//! Withdrawal details returned by `getWithdrawDetailsForUri`.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Reply payload of `getWithdrawDetailsForUri`.
///
/// The exchange section is only present once an exchange was selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawDetails {
    pub bank_withdraw_details: BankWithdrawDetails,
    #[serde(default)]
    pub exchange_withdraw_details: Option<ExchangeWithdrawDetails>,
}

/// What the bank reports about the withdrawal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankWithdrawDetails {
    pub amount: Amount,
    #[serde(default)]
    pub suggested_exchange: Option<String>,
    #[serde(default)]
    pub selection_done: bool,
    #[serde(default)]
    pub transfer_done: bool,
    #[serde(default)]
    pub confirm_transfer_url: Option<String>,
}

/// What the selected exchange reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeWithdrawDetails {
    pub terms_of_service_accepted: bool,
    pub exchange_info: ExchangeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    pub base_url: String,
    #[serde(default)]
    pub terms_of_service_text: Option<String>,
    #[serde(default)]
    pub terms_of_service_last_etag: Option<String>,
}
