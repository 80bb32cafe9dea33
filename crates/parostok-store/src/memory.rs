//! In-memory provenance store
//!
//! One `RwLock` guards all state, so every operation is linearized. Used
//! by tests and by `--in-memory` server runs.

use crate::error::StoreError;
use crate::traits::{check_run_writable, plan_upsert, ProvenanceStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use parostok_provenance::{
    Attribute, Catalog, CatalogEntry, Hybrid, HybridDraft, HybridId, JobId, Market, Run,
    RunSummary,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct MemoryState {
    hybrids: BTreeMap<HybridId, Hybrid>,
    attributes: HashMap<HybridId, BTreeMap<String, Attribute>>,
    runs: HashMap<JobId, Run>,
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored hybrids
    #[must_use]
    pub fn hybrid_count(&self) -> usize {
        self.state.read().hybrids.len()
    }
}

#[async_trait]
impl ProvenanceStore for MemoryStore {
    async fn ensure_hybrid(
        &self,
        draft: HybridDraft,
        seen_at: DateTime<Utc>,
    ) -> Result<HybridId, StoreError> {
        if !draft.is_complete() {
            return Err(StoreError::InvalidHybrid(format!(
                "name, market and source_url are required (got name={:?})",
                draft.name
            )));
        }
        let mut state = self.state.write();
        let id = draft.id();
        match state.hybrids.get_mut(&id) {
            Some(existing) => {
                existing.last_seen = seen_at;
                if draft.brand.is_some() {
                    existing.brand = draft.brand;
                }
            }
            None => {
                state
                    .hybrids
                    .insert(id.clone(), Hybrid::from_draft(draft, seen_at));
            }
        }
        Ok(id)
    }

    async fn upsert_attribute(
        &self,
        hybrid_id: &HybridId,
        attribute: Attribute,
    ) -> Result<UpsertOutcome, StoreError> {
        let attribute = attribute.verified()?;
        let mut state = self.state.write();
        let state = &mut *state;

        let hybrid = state
            .hybrids
            .get_mut(hybrid_id)
            .ok_or_else(|| StoreError::NotFound(format!("hybrid {hybrid_id}")))?;
        let attributes = state.attributes.entry(hybrid_id.clone()).or_default();

        let (outcome, write) = plan_upsert(attributes.get(&attribute.key), attribute);
        if let Some(write) = write {
            hybrid.last_updated = write.extracted_at.max(hybrid.last_updated);
            attributes.insert(write.key.clone(), write);
        }
        Ok(outcome)
    }

    async fn catalog(&self, market: Option<&Market>) -> Result<Catalog, StoreError> {
        let state = self.state.read();
        let entries = state
            .hybrids
            .values()
            .filter(|h| market.map_or(true, |m| &h.market == m))
            .map(|h| CatalogEntry {
                hybrid: h.clone(),
                attributes: state
                    .attributes
                    .get(&h.id)
                    .map(|a| a.values().cloned().collect())
                    .unwrap_or_default(),
            });
        Ok(Catalog::from_entries(entries))
    }

    async fn record_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut state = self.state.write();
        check_run_writable(state.runs.get(&run.job_id), run.job_id)?;
        state.runs.insert(run.job_id, run.clone());
        Ok(())
    }

    async fn run(&self, job_id: JobId) -> Result<Option<Run>, StoreError> {
        Ok(self.state.read().runs.get(&job_id).cloned())
    }

    async fn latest_run(&self) -> Result<Option<RunSummary>, StoreError> {
        Ok(self
            .state
            .read()
            .runs
            .values()
            .max_by(|a, b| {
                a.started_at
                    .cmp(&b.started_at)
                    .then_with(|| a.job_id.cmp(&b.job_id))
            })
            .map(Run::summary))
    }
}
