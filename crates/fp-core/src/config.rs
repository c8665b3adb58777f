//! Transaction manager configuration.

use crate::category::CategoryTable;
use crate::error::{TxnError, TxnResult};
use serde::{Deserialize, Serialize};

/// Configuration for a `TransactionManager`.
///
/// Every field has a default so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Maximum undo depth. Oldest entries are dropped first. Default: **100**.
    pub max_depth: usize,

    /// Honour `merge_previous` on commits. When **false**, every recorded
    /// commit becomes its own undo step. Default: **true**.
    pub merge_field_requests: bool,

    /// Display labels for log categories.
    pub categories: CategoryTable,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            merge_field_requests: true,
            categories: CategoryTable::default(),
        }
    }
}

impl TransactionConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> TxnResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| TxnError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TxnResult<()> {
        if self.max_depth == 0 {
            return Err(TxnError::config("max_depth must be at least 1"));
        }
        self.categories.validate()
    }
}
