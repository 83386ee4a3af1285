//! # Error Types
//!
//! Errors raised while decoding or combining wallet values.

use thiserror::Error;

/// Errors produced by [`crate::Amount`] parsing and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Text did not match `CURRENCY:VALUE[.FRACTION]`.
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    /// Fraction part was not below the fraction base.
    #[error("Invalid fraction {0}: must be below 100000000")]
    InvalidFraction(u32),

    /// Two amounts of different currencies were combined.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    /// Result does not fit in the value range.
    #[error("Amount overflow")]
    Overflow,
}

/// Errors produced when the engine's contract terms cannot be decoded.
#[derive(Debug, Error)]
pub enum ContractError {
    /// `contractTermsRaw` was neither a JSON string nor an object.
    #[error("Contract terms must be a JSON string or object")]
    UnexpectedShape,

    /// Contract terms JSON did not match the expected shape.
    #[error("Malformed contract terms: {0}")]
    Malformed(#[from] serde_json::Error),
}
