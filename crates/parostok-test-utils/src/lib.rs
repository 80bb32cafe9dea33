//! Testing utilities for the Parostok workspace
//!
//! Scripted adapters, a store that can be switched off, and fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parostok_core::{AdapterError, AdapterOutput, Candidate, SourceAdapter, SourceRegistry};
use parostok_provenance::{
    Attribute, AttributeValue, Catalog, HybridDraft, HybridId, JobId, Market, Run, RunSummary,
    Source, SourceId,
};
use parostok_store::{MemoryStore, ProvenanceStore, StoreError, UpsertOutcome};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const UA_PRODUCT_URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747";
pub const US_PRODUCT_URL: &str = "https://www.dekalb.com/products/corn/DKC62-08";

/// Product page as served by the DEKALB Ukraine site
pub const UA_PRODUCT_PAGE: &str = "<html><body>
  <h1>ДКС 3747</h1>
  <div>ФАО: 260</div>
  <div>Тип зерна: зубовидний</div>
  <div>Група стиглості: середньорання</div>
  <div>ОСНОВНІ ПЕРЕВАГИ\nСтабільний врожай</div>
  <div>ПОЗИЦІОНУВАННЯ ГІБРИДА\nЗона вирощування: усі зони</div>
  <div>ХАРАКТЕРИСТИКА ГІБРИДА\nХолодостійкість ● ● ● ● ● ● ● ● ● 9</div>
</body></html>";

/// Fixed timestamp for deterministic fixtures
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-04-01T06:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Observed attribute on `url`
pub fn observed_at(url: &str, key: &str, value: impl Into<AttributeValue>) -> Attribute {
    let value = value.into();
    let evidence = format!("{key}: {value}");
    Attribute::observed(key, value, url, evidence, fixed_time())
}

/// Observed attribute on the UA product page
pub fn observed(key: &str, value: impl Into<AttributeValue>) -> Attribute {
    observed_at(UA_PRODUCT_URL, key, value)
}

/// Corn candidate in `market` with the given attributes
pub fn candidate(name: &str, market: &str, attributes: Vec<Attribute>) -> Candidate {
    let url = attributes
        .iter()
        .find_map(|a| a.source_url.clone())
        .unwrap_or_else(|| UA_PRODUCT_URL.to_string());
    Candidate::new(
        HybridDraft::new(name, market, "corn", url).with_brand("DEKALB (Bayer)"),
        attributes,
    )
}

/// Registry over the given sources
pub fn registry(sources: impl IntoIterator<Item = Source>) -> Arc<SourceRegistry> {
    Arc::new(SourceRegistry::from_sources(sources).unwrap())
}

/// What a [`ScriptedAdapter`] does when called
#[derive(Debug, Clone)]
pub enum Script {
    /// Return these candidates
    Candidates(Vec<Candidate>),
    /// Sleep, then return these candidates
    Delayed(Duration, Vec<Candidate>),
    /// Fail with this error
    Fail(AdapterError),
    /// Sleep far past any sane timeout
    Hang,
}

/// Adapter with canned behaviour that counts its invocations
#[derive(Debug)]
pub struct ScriptedAdapter {
    id: SourceId,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(id: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::new(id),
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn returning(id: &str, candidates: Vec<Candidate>) -> Arc<Self> {
        Self::new(id, Script::Candidates(candidates))
    }

    pub fn failing(id: &str, error: AdapterError) -> Arc<Self> {
        Self::new(id, Script::Fail(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source_id(&self) -> SourceId {
        self.id.clone()
    }

    async fn fetch(&self, _source: &Source) -> Result<AdapterOutput, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Candidates(c) => Ok(AdapterOutput::from_candidates(c.clone())),
            Script::Delayed(delay, c) => {
                tokio::time::sleep(*delay).await;
                Ok(AdapterOutput::from_candidates(c.clone()))
            }
            Script::Fail(err) => Err(err.clone()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AdapterOutput::default())
            }
        }
    }
}

/// Memory store whose writes can be made to fail as if the backend died
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    writes: AtomicUsize,
    catalog_stall_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store that is unavailable from the start
    pub fn unavailable() -> Arc<Self> {
        let store = Self::default();
        store.down.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Hold the next catalog read for `delay` after it has been taken
    pub fn stall_next_catalog(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.catalog_stall_ms.store(ms, Ordering::SeqCst);
    }

    /// Successful attribute writes
    pub fn attribute_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("database is locked".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProvenanceStore for FlakyStore {
    async fn ensure_hybrid(
        &self,
        draft: HybridDraft,
        seen_at: DateTime<Utc>,
    ) -> Result<HybridId, StoreError> {
        self.check()?;
        self.inner.ensure_hybrid(draft, seen_at).await
    }

    async fn upsert_attribute(
        &self,
        hybrid_id: &HybridId,
        attribute: Attribute,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check()?;
        let outcome = self.inner.upsert_attribute(hybrid_id, attribute).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn catalog(&self, market: Option<&Market>) -> Result<Catalog, StoreError> {
        let catalog = self.inner.catalog(market).await?;
        let stall = self.catalog_stall_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        Ok(catalog)
    }

    async fn record_run(&self, run: &Run) -> Result<(), StoreError> {
        self.check()?;
        self.inner.record_run(run).await
    }

    async fn run(&self, job_id: JobId) -> Result<Option<Run>, StoreError> {
        self.inner.run(job_id).await
    }

    async fn latest_run(&self) -> Result<Option<RunSummary>, StoreError> {
        self.inner.latest_run().await
    }
}
