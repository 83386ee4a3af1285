//! `taler://` deep links.

use crate::error::UriError;

const SCHEME: &str = "taler://";

/// What a deep link asks the wallet to do. Carries the link as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriAction {
    Payment(String),
    Withdrawal(String),
    /// Refund links are recognised but not supported.
    RefundUnsupported(String),
}

impl UriAction {
    pub fn uri(&self) -> &str {
        match self {
            UriAction::Payment(uri) | UriAction::Withdrawal(uri) | UriAction::RefundUnsupported(uri) => {
                uri
            }
        }
    }
}

/// Classify a deep link. The scheme and action are matched case-insensitively.
pub fn parse_taler_uri(uri: &str) -> Result<UriAction, UriError> {
    let trimmed = uri.trim();
    let lower = trimmed.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix(SCHEME) else {
        return Err(UriError::NotTaler(uri.to_string()));
    };

    let owned = trimmed.to_string();
    if rest.starts_with("pay/") {
        Ok(UriAction::Payment(owned))
    } else if rest.starts_with("withdraw/") {
        Ok(UriAction::Withdrawal(owned))
    } else if rest.starts_with("refund/") {
        Ok(UriAction::RefundUnsupported(owned))
    } else {
        Err(UriError::UnsupportedAction(uri.to_string()))
    }
}
