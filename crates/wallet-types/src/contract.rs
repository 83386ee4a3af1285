//! Merchant contract terms shown before a payment is confirmed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::Amount;
use crate::errors::{AmountError, ContractError};

/// The subset of a merchant contract the wallet presents to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub summary: String,
    #[serde(default)]
    pub products: Vec<ContractProduct>,
    pub amount: Amount,
}

/// One line item of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProduct {
    #[serde(default)]
    pub product_id: Option<String>,
    pub description: String,
    pub price: Amount,
    #[serde(default)]
    pub delivery_location: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl ContractProduct {
    /// `price × quantity`.
    pub fn total_price(&self) -> Result<Amount, AmountError> {
        self.price.checked_mul(self.quantity)
    }
}

impl ContractTerms {
    /// Decode the engine's `contractTermsRaw` field.
    ///
    /// The engine ships contract terms as an embedded JSON string; some
    /// versions inline the object instead. Both are accepted.
    pub fn from_raw(raw: &Value) -> Result<Self, ContractError> {
        match raw {
            Value::String(text) => Ok(serde_json::from_str(text)?),
            Value::Object(_) => Ok(serde_json::from_value(raw.clone())?),
            _ => Err(ContractError::UnexpectedShape),
        }
    }
}
