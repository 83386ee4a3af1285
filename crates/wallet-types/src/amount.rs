//! Monetary amounts as the wallet engine encodes them.
//!
//! The engine uses two encodings for the same value:
//!
//! - text: `"KUDOS:10.5"`
//! - object: `{"currency": "KUDOS", "value": 10, "fraction": 50000000}`
//!
//! Both decode into [`Amount`]. Amounts always serialize back as text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AmountError;

/// Number of fraction units in one value unit.
pub const FRACTION_BASE: u32 = 100_000_000;

/// Maximum number of fractional digits in the text encoding.
const FRACTION_DIGITS: usize = 8;

/// A currency-tagged amount with fixed-point fraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AmountRepr", into = "String")]
pub struct Amount {
    currency: String,
    value: u64,
    fraction: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Object {
        currency: String,
        value: u64,
        #[serde(default)]
        fraction: u32,
    },
}

impl TryFrom<AmountRepr> for Amount {
    type Error = AmountError;

    fn try_from(repr: AmountRepr) -> Result<Self, Self::Error> {
        match repr {
            AmountRepr::Text(text) => text.parse(),
            AmountRepr::Object {
                currency,
                value,
                fraction,
            } => Amount::new(currency, value, fraction),
        }
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

impl Amount {
    /// Create an amount, rejecting an out-of-range fraction or empty currency.
    pub fn new(currency: impl Into<String>, value: u64, fraction: u32) -> Result<Self, AmountError> {
        let currency = currency.into();
        validate_currency(&currency)?;
        if fraction >= FRACTION_BASE {
            return Err(AmountError::InvalidFraction(fraction));
        }
        Ok(Self {
            currency,
            value,
            fraction,
        })
    }

    /// Zero in the given currency.
    pub fn zero(currency: impl Into<String>) -> Result<Self, AmountError> {
        Self::new(currency, 0, 0)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0 && self.fraction == 0
    }

    /// The numeric part without currency, e.g. `"10.5"`.
    pub fn amount_str(&self) -> String {
        if self.fraction == 0 {
            return self.value.to_string();
        }
        let digits = format!("{:08}", self.fraction);
        format!("{}.{}", self.value, digits.trim_end_matches('0'))
    }

    /// Add two amounts of the same currency.
    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        if self.currency != other.currency {
            return Err(AmountError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        let fraction = self.fraction + other.fraction;
        let carry = u64::from(fraction / FRACTION_BASE);
        let value = self
            .value
            .checked_add(other.value)
            .and_then(|v| v.checked_add(carry))
            .ok_or(AmountError::Overflow)?;
        Ok(Amount {
            currency: self.currency.clone(),
            value,
            fraction: fraction % FRACTION_BASE,
        })
    }

    /// Multiply by an integer quantity.
    pub fn checked_mul(&self, factor: u32) -> Result<Amount, AmountError> {
        let total_fraction = u64::from(self.fraction) * u64::from(factor);
        let base = u64::from(FRACTION_BASE);
        let value = self
            .value
            .checked_mul(u64::from(factor))
            .and_then(|v| v.checked_add(total_fraction / base))
            .ok_or(AmountError::Overflow)?;
        Ok(Amount {
            currency: self.currency.clone(),
            value,
            // Remainder of a division by FRACTION_BASE always fits in u32.
            fraction: (total_fraction % base) as u32,
        })
    }
}

fn validate_currency(currency: &str) -> Result<(), AmountError> {
    if currency.is_empty() || currency.len() > 12 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AmountError::InvalidFormat(format!("bad currency '{currency}'")));
    }
    Ok(())
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (currency, number) = s
            .split_once(':')
            .ok_or_else(|| AmountError::InvalidFormat(s.to_string()))?;
        let (value_part, fraction_part) = match number.split_once('.') {
            Some((v, f)) => (v, f),
            None => (number, ""),
        };
        if value_part.is_empty() || !value_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        if fraction_part.len() > FRACTION_DIGITS || !fraction_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        if number.ends_with('.') {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        let value = value_part
            .parse::<u64>()
            .map_err(|_| AmountError::Overflow)?;
        let fraction = if fraction_part.is_empty() {
            0
        } else {
            let padded = format!("{fraction_part:0<width$}", width = FRACTION_DIGITS);
            padded
                .parse::<u32>()
                .map_err(|_| AmountError::InvalidFormat(s.to_string()))?
        };
        Amount::new(currency, value, fraction)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.currency, self.amount_str())
    }
}
