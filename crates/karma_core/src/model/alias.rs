//! Alias relation model.

use crate::model::karma::normalize_name;
use serde::{Deserialize, Serialize};

/// One `alias` row: `alias` is also known as `name`.
///
/// Rows are not deduplicated; the same pair may be stored more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Canonical name as declared.
    pub name: String,
    /// Case-folded canonical name used for lookups.
    pub normalized: String,
    /// Alias string exactly as declared.
    pub alias: String,
}

impl AliasRecord {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        let name = name.into();
        let normalized = normalize_name(&name);
        Self {
            name,
            normalized,
            alias: alias.into(),
        }
    }
}
