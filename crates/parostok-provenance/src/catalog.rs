//! Catalog view: hybrids with attributes grouped by market

use crate::hybrid::{CatalogEntry, Market};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Catalog grouped by market
///
/// Serialized as `{"crops": {<market>: [...]}}`, the schema shared by the
/// HTTP surface and the fallback snapshot. Ordering is canonical: markets
/// by code, hybrids by (name, id), attributes by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Entries per market
    pub crops: BTreeMap<Market, Vec<CatalogEntry>>,
}

impl Catalog {
    /// Build a catalog from unordered entries
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut crops: BTreeMap<Market, Vec<CatalogEntry>> = BTreeMap::new();
        for mut entry in entries {
            entry.attributes.sort_by(|a, b| a.key.cmp(&b.key));
            crops
                .entry(entry.hybrid.market.clone())
                .or_default()
                .push(entry);
        }
        for list in crops.values_mut() {
            list.sort_by(|a, b| {
                a.hybrid
                    .name
                    .cmp(&b.hybrid.name)
                    .then_with(|| a.hybrid.id.cmp(&b.hybrid.id))
            });
        }
        Self { crops }
    }

    /// Total number of hybrids
    #[inline]
    #[must_use]
    pub fn hybrid_count(&self) -> usize {
        self.crops.values().map(Vec::len).sum()
    }

    /// Total number of attributes
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.crops
            .values()
            .flatten()
            .map(|e| e.attributes.len())
            .sum()
    }

    /// Iterate all entries in canonical order
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.crops.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::hybrid::{Hybrid, HybridDraft};
    use chrono::Utc;

    fn entry(name: &str, market: &str, keys: &[&str]) -> CatalogEntry {
        let now = Utc::now();
        let draft = HybridDraft::new(name, market, "corn", format!("https://x/{name}"));
        CatalogEntry {
            hybrid: Hybrid::from_draft(draft, now),
            attributes: keys
                .iter()
                .map(|k| Attribute::observed(*k, "v", "https://x", "v", now))
                .collect(),
        }
    }

    #[test]
    fn groups_and_orders() {
        let catalog = Catalog::from_entries(vec![
            entry("b", "UA", &["z", "a"]),
            entry("a", "UA", &[]),
            entry("c", "US", &["k"]),
        ]);
        assert_eq!(catalog.crops.len(), 2);
        let ua = &catalog.crops[&Market::new("UA")];
        assert_eq!(ua[0].hybrid.name, "a");
        assert_eq!(ua[1].attributes[0].key, "a");
        assert_eq!(catalog.hybrid_count(), 3);
        assert_eq!(catalog.attribute_count(), 3);
    }

    #[test]
    fn serializes_under_crops_key() {
        let json = serde_json::to_value(Catalog::default()).unwrap();
        assert!(json.get("crops").is_some());
    }
}
