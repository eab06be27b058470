//! Category resolution for transaction records.
//!
//! A recipient's declared classification (a free-form string on their
//! profile) maps to a configured [`CategoryId`]. Resolution is total:
//! an absent or unknown classification degrades to the caller-supplied
//! fallback, never an error. The fallback differs per protocol — internal
//! transfers use [`CategoryId::TRANSFERS`], phone-directed transfers and
//! purchases use [`CategoryId::OTHER`] — and the two defaults are
//! deliberately kept distinct.

use std::collections::HashMap;

use payloads::CategoryId;

#[derive(Debug, Clone, Default)]
pub struct CategoryResolver {
    by_classification: HashMap<String, CategoryId>,
}

impl CategoryResolver {
    /// Resolver with no configured classifications; everything falls back.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        by_classification: impl IntoIterator<Item = (String, CategoryId)>,
    ) -> Self {
        Self {
            by_classification: by_classification.into_iter().collect(),
        }
    }

    /// Map a declared classification to its configured category, or the
    /// fallback when the classification is missing or not configured.
    pub fn resolve(
        &self,
        declared: Option<&str>,
        fallback: CategoryId,
    ) -> CategoryId {
        declared
            .and_then(|c| self.by_classification.get(c).copied())
            .unwrap_or(fallback)
    }
}
