//! Pending operations reported by `getPendingOperations`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reply payload of `getPendingOperations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperations {
    #[serde(default)]
    pub pending_operations: Vec<PendingOperationInfo>,
}

/// One pending operation. Only the tag and liveness flag are interpreted;
/// the rest is kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperationInfo {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub gives_lifeness: bool,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl PendingOperations {
    pub fn len(&self) -> usize {
        self.pending_operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_operations.is_empty()
    }

    /// True if any operation keeps the wallet busy.
    pub fn gives_lifeness(&self) -> bool {
        self.pending_operations.iter().any(|op| op.gives_lifeness)
    }
}
