//! Wallet balances per currency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub available: Amount,
    pub pending_incoming: Amount,
}

impl BalanceEntry {
    pub fn currency(&self) -> &str {
        self.available.currency()
    }
}

/// All balances, ordered by currency code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletBalances {
    /// False until the first successful `getBalances` reply.
    pub initialized: bool,
    pub by_currency: Vec<BalanceEntry>,
}

/// Reply payload of `getBalances`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    #[serde(default)]
    pub by_currency: BTreeMap<String, BalanceEntry>,
}

impl From<BalancesResponse> for WalletBalances {
    fn from(response: BalancesResponse) -> Self {
        Self {
            initialized: true,
            by_currency: response.by_currency.into_values().collect(),
        }
    }
}
