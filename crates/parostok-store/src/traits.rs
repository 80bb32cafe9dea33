//! The store capability and the write rules every backend shares

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parostok_provenance::{
    Attribute, Catalog, HybridDraft, HybridId, JobId, Market, Run, RunSummary,
};
use serde::{Deserialize, Serialize};

/// Result of a single attribute write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// No attribute existed for the key
    Added,
    /// The stored attribute was replaced
    Updated,
    /// Same fact observed again; stored record untouched
    Unchanged,
}

/// Durable substrate for hybrids, attributes and runs
///
/// Implementations must be internally synchronized: each call is atomic
/// with respect to every other call on the same store.
#[async_trait]
pub trait ProvenanceStore: Send + Sync + std::fmt::Debug {
    /// Insert the hybrid if new, otherwise mark it seen at `seen_at`
    async fn ensure_hybrid(
        &self,
        draft: HybridDraft,
        seen_at: DateTime<Utc>,
    ) -> Result<HybridId, StoreError>;

    /// Insert or replace the attribute for its key
    ///
    /// # Errors
    /// - `Provenance` when the attribute fails [`Attribute::verified`]
    /// - `NotFound` when the hybrid does not exist
    async fn upsert_attribute(
        &self,
        hybrid_id: &HybridId,
        attribute: Attribute,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Current catalog, optionally restricted to one market
    async fn catalog(&self, market: Option<&Market>) -> Result<Catalog, StoreError>;

    /// Insert or update a run keyed by job id
    ///
    /// # Errors
    /// `AlreadyFinalized` if the stored run is terminal
    async fn record_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Look up a run
    async fn run(&self, job_id: JobId) -> Result<Option<Run>, StoreError>;

    /// Most recently started run
    async fn latest_run(&self) -> Result<Option<RunSummary>, StoreError>;
}

/// Decide what a verified write does to the stored attribute
///
/// An explicit "unknown" never erases a stored value: only positively
/// observed facts add or correct.
pub(crate) fn plan_upsert(
    existing: Option<&Attribute>,
    incoming: Attribute,
) -> (UpsertOutcome, Option<Attribute>) {
    match existing {
        None => (UpsertOutcome::Added, Some(incoming)),
        Some(current) if current.same_content(&incoming) => (UpsertOutcome::Unchanged, None),
        Some(current) if incoming.value.is_none() && current.value.is_some() => {
            (UpsertOutcome::Unchanged, None)
        }
        Some(_) => (UpsertOutcome::Updated, Some(incoming)),
    }
}

/// Guard shared by run writes
pub(crate) fn check_run_writable(stored: Option<&Run>, job_id: JobId) -> Result<(), StoreError> {
    match stored {
        Some(existing) if existing.is_terminal() => Err(StoreError::AlreadyFinalized(job_id)),
        _ => Ok(()),
    }
}
