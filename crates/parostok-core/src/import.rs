//! Manual import
//!
//! Operators load provenance-complete attributes directly, bypassing
//! adapters. A payload is validated in full before anything is written:
//! one bad attribute rejects the whole import.

use crate::error::CatalogError;
use chrono::Utc;
use parostok_provenance::{Attribute, HybridDraft, ProvenanceError};
use parostok_store::{ProvenanceStore, UpsertOutcome};
use serde::{Deserialize, Serialize};

/// One product with its attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportItem {
    /// Identity fields
    #[serde(flatten)]
    pub hybrid: HybridDraft,
    /// Attributes with full provenance
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

/// Request body of a manual import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualImport {
    /// Products to load
    pub items: Vec<ImportItem>,
}

/// What an import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Products touched
    pub hybrids: u64,
    /// Attributes newly written
    pub added: u64,
    /// Attributes replaced
    pub updated: u64,
    /// Attributes already stored as-is
    pub unchanged: u64,
}

impl ManualImport {
    /// Check every item and attribute without writing
    ///
    /// Manual attributes must carry a value; an explicit "unknown" has no
    /// place in an operator-supplied payload.
    ///
    /// # Errors
    /// `InvalidRequest` for an item with blank identity fields,
    /// `Provenance` for the first attribute failing verification
    pub fn validate(self) -> Result<Vec<ImportItem>, CatalogError> {
        let mut checked = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            if !item.hybrid.is_complete() {
                return Err(CatalogError::InvalidRequest(format!(
                    "item {index}: name, market and source_url are required"
                )));
            }
            let mut attributes = Vec::with_capacity(item.attributes.len());
            for attr in item.attributes {
                if attr.value.is_none() {
                    let err = ProvenanceError::invalid(&attr.key, "manual import requires a value");
                    return Err(err.into());
                }
                if attr.evidence_hash.is_none() {
                    let err = ProvenanceError::invalid(&attr.key, "manual import requires evidence_hash");
                    return Err(err.into());
                }
                attributes.push(attr.verified()?);
            }
            checked.push(ImportItem {
                hybrid: item.hybrid,
                attributes,
            });
        }
        Ok(checked)
    }
}

/// Write validated items
///
/// # Errors
/// Store failures, surfaced directly
pub async fn apply(
    store: &dyn ProvenanceStore,
    items: Vec<ImportItem>,
) -> Result<ImportReport, CatalogError> {
    let mut report = ImportReport::default();
    for item in items {
        let id = store.ensure_hybrid(item.hybrid, Utc::now()).await?;
        report.hybrids += 1;
        for attr in item.attributes {
            match store.upsert_attribute(&id, attr).await? {
                UpsertOutcome::Added => report.added += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }
    }
    tracing::info!(
        hybrids = report.hybrids,
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        "manual import applied"
    );
    Ok(report)
}
