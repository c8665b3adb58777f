//! Operation categories used to group requests and commands in audit logs.
//!
//! The set of categories is closed. Display labels are data: the host passes
//! a `CategoryTable` in through configuration instead of reading globals.

use crate::error::{TxnError, TxnResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed enumeration of log groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogGroupType {
    WallOperation,
    FaceOperation,
    ContentOperation,
    ThumbnailView,
    SlabEdit,
    OutdoorDrawing,
    CatalogOperation,
    ViewOperation,
}

impl LogGroupType {
    pub const ALL: [LogGroupType; 8] = [
        LogGroupType::WallOperation,
        LogGroupType::FaceOperation,
        LogGroupType::ContentOperation,
        LogGroupType::ThumbnailView,
        LogGroupType::SlabEdit,
        LogGroupType::OutdoorDrawing,
        LogGroupType::CatalogOperation,
        LogGroupType::ViewOperation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogGroupType::WallOperation => "WallOperation",
            LogGroupType::FaceOperation => "FaceOperation",
            LogGroupType::ContentOperation => "ContentOperation",
            LogGroupType::ThumbnailView => "ThumbnailView",
            LogGroupType::SlabEdit => "SlabEdit",
            LogGroupType::OutdoorDrawing => "OutdoorDrawing",
            LogGroupType::CatalogOperation => "CatalogOperation",
            LogGroupType::ViewOperation => "ViewOperation",
        }
    }

    /// Parse a category name. Unknown names are rejected.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for LogGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display labels for each category.
///
/// Missing entries fall back to the variant name, so `label()` is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTable {
    labels: HashMap<LogGroupType, String>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the label of one category.
    pub fn with_label(mut self, category: LogGroupType, label: impl Into<String>) -> Self {
        self.labels.insert(category, label.into());
        self
    }

    pub fn label(&self, category: LogGroupType) -> &str {
        self.labels
            .get(&category)
            .map(String::as_str)
            .unwrap_or(category.as_str())
    }

    /// Reject empty or whitespace-only labels.
    pub fn validate(&self) -> TxnResult<()> {
        for (category, label) in &self.labels {
            if label.trim().is_empty() {
                return Err(TxnError::config(format!(
                    "empty label for category {category}"
                )));
            }
        }
        Ok(())
    }
}
