//! Errors raised by the wallet model.

use thiserror::Error;
use wallet_backend::BridgeError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Terms of service can only be accepted while they are being reviewed.
    #[error("no terms of service are awaiting review")]
    NotReviewingTerms,

    /// A withdrawal can only be confirmed once its details are loaded.
    #[error("no withdrawal details are ready for {0}")]
    WithdrawalNotReady(String),

    #[error(transparent)]
    Uri(#[from] UriError),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// A deep link this wallet cannot handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("not a taler:// URI: {0}")]
    NotTaler(String),

    #[error("unsupported taler:// action in {0}")]
    UnsupportedAction(String),
}
