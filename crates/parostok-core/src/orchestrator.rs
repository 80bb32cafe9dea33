//! Update job orchestrator
//!
//! Each submitted job runs as its own tokio task. Progress is published
//! through a shared [`Run`] record: the task is its only writer, readers
//! clone it under a read lock, so every reader sees a prefix of the final
//! log. The record is also persisted after every log line.
//!
//! # Job lifecycle
//!
//! ```text
//! pending ──► running ──► succeeded
//!    │           │
//!    └───────────┴──────► failed
//! ```
//!
//! Per-source and per-attribute problems are logged and skipped. Only an
//! unavailable store or a malformed request fails a job.

use crate::adapter::{AdapterSet, Candidate, SourceAdapter};
use crate::error::{AdapterError, CatalogError};
use crate::import::{self, ImportReport, ManualImport};
use crate::registry::SourceRegistry;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use parostok_provenance::{
    Catalog, JobId, Market, Run, RunCounts, RunRequest, RunStatus, RunSummary, Source,
};
use parostok_store::{
    ProvenanceStore, SnapshotPublisher, SnapshotReceipt, StoreError, UpsertOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Default budget for one adapter invocation
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry entry with its latest run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    /// Registry entry
    #[serde(flatten)]
    pub source: Source,
    /// Latest run that requested this source
    pub last_run: Option<JobId>,
}

/// Registry view served to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesOverview {
    /// Sources in registry order
    pub sources: Vec<SourceStatus>,
    /// Most recently started run
    pub latest_run: Option<RunSummary>,
}

/// Builder for [`Orchestrator`]
#[derive(Debug)]
pub struct OrchestratorBuilder {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn ProvenanceStore>,
    adapters: AdapterSet,
    publisher: Option<SnapshotPublisher>,
    adapter_timeout: Duration,
}

impl OrchestratorBuilder {
    /// With adapters
    #[inline]
    #[must_use]
    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// With snapshot publisher
    #[inline]
    #[must_use]
    pub fn publisher(mut self, publisher: SnapshotPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// With adapter timeout
    #[inline]
    #[must_use]
    pub fn adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                registry: self.registry,
                store: self.store,
                adapters: self.adapters,
                publisher: self.publisher,
                adapter_timeout: self.adapter_timeout,
                runs: DashMap::new(),
                publish_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn ProvenanceStore>,
    adapters: AdapterSet,
    publisher: Option<SnapshotPublisher>,
    adapter_timeout: Duration,
    runs: DashMap<JobId, Arc<RwLock<Run>>>,
    /// Held from catalog read to snapshot rename
    publish_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    /// Publish the catalog as it is now
    ///
    /// Publishers are serialized, so the last file written always holds
    /// the newest catalog read.
    async fn publish_current(&self) -> Result<Option<SnapshotReceipt>, CatalogError> {
        let Some(publisher) = &self.publisher else {
            return Ok(None);
        };
        let _guard = self.publish_lock.lock().await;
        let catalog = self.store.catalog(None).await?;
        Ok(Some(publisher.publish(&catalog).await?))
    }
}

/// Runs update jobs and answers status queries
///
/// Cheap to clone; clones share jobs and collaborators.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Start building an orchestrator over an injected registry and store
    #[must_use]
    pub fn builder(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn ProvenanceStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            store,
            adapters: AdapterSet::new(),
            publisher: None,
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
        }
    }

    /// Registry in use
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    /// Store in use
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProvenanceStore> {
        &self.inner.store
    }

    /// Accept a job and start it in the background
    ///
    /// Returns as soon as the job is registered. Unknown source ids are
    /// logged as warnings and the job continues with the rest; a request
    /// with a blank market or source id is recorded as `failed`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: RunRequest) -> JobId {
        let job_id = JobId::new();
        let now = Utc::now();
        let mut run = Run::new(job_id, request, now);

        if let Some(problem) = run.request.malformation() {
            let err = CatalogError::InvalidRequest(problem);
            append(&mut run, format!("Rejected request: {err}"));
            if let Err(err) = run.transition(RunStatus::Failed, now) {
                tracing::error!(job_id = %job_id, "{}", err);
            }
        } else {
            if let Err(err) = run.transition(RunStatus::Running, now) {
                tracing::error!(job_id = %job_id, "{}", err);
            }
            append(&mut run, "Starting catalog sync job.");
            let unknown: Vec<String> = run
                .request
                .sources
                .iter()
                .filter(|id| !self.inner.registry.contains(id))
                .map(ToString::to_string)
                .collect();
            for id in unknown {
                append(&mut run, format!("Warning: unknown source {id} ignored."));
            }
        }

        tracing::info!(job_id = %job_id, status = %run.status, "job submitted");
        let run = Arc::new(RwLock::new(run));
        self.inner.runs.insert(job_id, Arc::clone(&run));

        let job = Job {
            inner: Arc::clone(&self.inner),
            run,
            job_id,
            fault: None,
        };
        tokio::spawn(job.execute());
        job_id
    }

    /// Current state of a job
    ///
    /// Jobs of this process are answered from memory; older jobs from the
    /// store.
    ///
    /// # Errors
    /// `JobNotFound` for an unknown id, `Store` if the fallback lookup fails
    pub async fn get_status(&self, job_id: JobId) -> Result<Run, CatalogError> {
        if let Some(run) = self.inner.runs.get(&job_id) {
            return Ok(run.read().clone());
        }
        self.inner
            .store
            .run(job_id)
            .await?
            .ok_or(CatalogError::JobNotFound(job_id))
    }

    /// Poll until the job is terminal
    ///
    /// # Errors
    /// See [`get_status`](Self::get_status)
    pub async fn wait(&self, job_id: JobId, poll: Duration) -> Result<Run, CatalogError> {
        loop {
            let run = self.get_status(job_id).await?;
            if run.is_terminal() {
                return Ok(run);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Most recently started job, from memory or the store
    ///
    /// # Errors
    /// Never fails on store errors; they are logged and memory is used.
    pub async fn latest_run(&self) -> Result<Option<RunSummary>, CatalogError> {
        let in_memory = self
            .inner
            .runs
            .iter()
            .map(|entry| entry.value().read().summary())
            .max_by_key(|s| (s.started_at, s.job_id));
        let stored = match self.inner.store.latest_run().await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("latest run lookup failed: {}", err);
                None
            }
        };
        Ok(in_memory
            .into_iter()
            .chain(stored)
            .max_by_key(|s| (s.started_at, s.job_id)))
    }

    /// Registry with each source's latest run
    ///
    /// # Errors
    /// See [`latest_run`](Self::latest_run)
    pub async fn sources(&self) -> Result<SourcesOverview, CatalogError> {
        let latest_run = self.latest_run().await?;
        let sources = self
            .inner
            .registry
            .list()
            .map(|source| SourceStatus {
                last_run: latest_run
                    .as_ref()
                    .filter(|run| run.sources.contains(&source.id))
                    .map(|run| run.job_id),
                source: source.clone(),
            })
            .collect();
        Ok(SourcesOverview {
            sources,
            latest_run,
        })
    }

    /// Current catalog
    ///
    /// # Errors
    /// `Store` on backend failure
    pub async fn catalog(&self, market: Option<&Market>) -> Result<Catalog, CatalogError> {
        Ok(self.inner.store.catalog(market).await?)
    }

    /// Write the fallback snapshot now
    ///
    /// Returns `None` when no publisher is configured.
    ///
    /// # Errors
    /// `Store` if the catalog cannot be read, `Snapshot` if it cannot be
    /// written
    pub async fn publish_snapshot(&self) -> Result<Option<SnapshotReceipt>, CatalogError> {
        self.inner.publish_current().await
    }

    /// Validate and apply a manual import, then republish the snapshot
    ///
    /// # Errors
    /// Validation errors reject the whole payload before any write; store
    /// errors are surfaced as-is. Snapshot failures are only logged.
    pub async fn manual_import(&self, payload: ManualImport) -> Result<ImportReport, CatalogError> {
        let items = payload.validate()?;
        let report = import::apply(self.inner.store.as_ref(), items).await?;
        if let Err(err) = self.publish_snapshot().await {
            tracing::warn!("snapshot after manual import failed: {}", err);
        }
        Ok(report)
    }
}

/// Append a log line before the job task owns the run
fn append(run: &mut Run, message: impl Into<String>) {
    let message = message.into();
    tracing::info!(job_id = %run.job_id, "{}", message);
    if let Err(err) = run.log(message, Utc::now()) {
        tracing::warn!(job_id = %run.job_id, "dropped log line: {}", err);
    }
}

/// One executing job
struct Job {
    inner: Arc<Inner>,
    run: Arc<RwLock<Run>>,
    job_id: JobId,
    /// First job-fatal failure
    fault: Option<CatalogError>,
}

impl Job {
    #[instrument(name = "catalog_job", skip_all, fields(job_id = %self.job_id))]
    async fn execute(mut self) {
        let (request, snapshot) = {
            let run = self.run.read();
            (run.request.clone(), run.clone())
        };
        self.persist(&snapshot).await;
        if snapshot.is_terminal() {
            return;
        }

        let registry = Arc::clone(&self.inner.registry);
        let requested: HashSet<_> = request.sources.iter().collect();
        let mut attempted = 0_usize;

        for source in registry.list().filter(|s| requested.contains(&s.id)) {
            if self.fault.is_some() {
                break;
            }
            if !source.enabled {
                let reason = source.disablement_reason().unwrap_or_default();
                let gate = CatalogError::SourceDisabled {
                    id: source.id.clone(),
                    reason: reason.to_string(),
                };
                tracing::warn!("{}", gate);
                self.log(format!("Source {} disabled: {}", source.id, reason)).await;
                continue;
            }
            if !request.markets.is_empty() && !request.markets.contains(&source.market) {
                self.log(format!(
                    "Source {} skipped: market {} not requested.",
                    source.id, source.market
                ))
                .await;
                continue;
            }
            attempted += 1;
            let Some(adapter) = self.inner.adapters.get(&source.id) else {
                self.log(format!(
                    "Source {} currently has no adapter implementation.",
                    source.id
                ))
                .await;
                continue;
            };
            self.process_source(source, adapter.as_ref(), request.dry_run)
                .await;
        }

        if attempted == 0 && self.fault.is_none() {
            self.log("No enabled sources. Nothing fetched.").await;
        }
        if self.fault.is_none() {
            self.publish().await;
        }

        let status = if self.fault.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        self.finish(status).await;
    }

    async fn process_source(&mut self, source: &Source, adapter: &dyn SourceAdapter, dry_run: bool) {
        self.log(format!("Fetching {}.", source.id)).await;

        let budget = self.inner.adapter_timeout;
        let output = match tokio::time::timeout(budget, adapter.fetch(source)).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return self.source_failed(source, err).await,
            Err(_) => return self.source_failed(source, AdapterError::Timeout(budget)).await,
        };

        self.update_counts(|c| c.discovered += output.discovered as u64);
        if output.catalog_pages > 0 {
            self.log(format!("Discovered catalog pages: {}", output.catalog_pages))
                .await;
        }
        self.log(format!("Discovered product pages: {}", output.discovered))
            .await;

        if dry_run {
            let products = output.candidates.len();
            self.update_counts(|c| c.parsed += products as u64);
            self.log(format!(
                "Dry-run enabled. Skipping database writes ({} products, {} attributes found).",
                products,
                output.attribute_count()
            ))
            .await;
            return;
        }

        let mut counts = RunCounts::default();
        for candidate in output.candidates {
            if self.fault.is_some() {
                break;
            }
            self.write_candidate(candidate, &mut counts).await;
        }
        self.update_counts(|c| c.absorb(&counts));

        self.log(format!("Parsed products: {}", counts.parsed)).await;
        self.log(format!(
            "Source {} done: written={} (added={} updated={} unchanged={}) skipped={}",
            source.id,
            counts.written(),
            counts.added,
            counts.updated,
            counts.unchanged,
            counts.skipped
        ))
        .await;
    }

    async fn write_candidate(&mut self, candidate: Candidate, counts: &mut RunCounts) {
        counts.parsed += 1;
        let name = candidate.draft.name.clone();
        let store = Arc::clone(&self.inner.store);

        let hybrid_id = match store.ensure_hybrid(candidate.draft, Utc::now()).await {
            Ok(id) => id,
            Err(err) => {
                self.store_error(format!("product {name}"), err, counts).await;
                return;
            }
        };

        for attribute in candidate.attributes {
            let key = attribute.key.clone();
            match store.upsert_attribute(&hybrid_id, attribute).await {
                Ok(UpsertOutcome::Added) => counts.added += 1,
                Ok(UpsertOutcome::Updated) => counts.updated += 1,
                Ok(UpsertOutcome::Unchanged) => counts.unchanged += 1,
                Err(err) => {
                    self.store_error(format!("attribute {key} of {name}"), err, counts)
                        .await;
                    if self.fault.is_some() {
                        return;
                    }
                }
            }
            tracing::debug!(hybrid = %hybrid_id, key = %key, "attribute processed");
        }
    }

    async fn store_error(&mut self, subject: String, err: StoreError, counts: &mut RunCounts) {
        let err = CatalogError::from(err);
        if err.is_job_fatal() {
            tracing::error!("store failure writing {}: {}", subject, err);
            self.log(format!("Store unavailable while writing {subject}: {err}"))
                .await;
            self.fault.get_or_insert(err);
        } else {
            counts.skipped += 1;
            tracing::warn!("skipped {}: {}", subject, err);
            self.log(format!("Skipped {subject}: {err}")).await;
        }
    }

    async fn source_failed(&mut self, source: &Source, error: AdapterError) {
        let message = format!("Source {} failed: {}", source.id, error);
        let failure = CatalogError::AdapterFailure {
            id: source.id.clone(),
            error,
        };
        tracing::warn!(retryable = failure.is_retryable(), "{}", failure);
        self.update_counts(|c| c.errors += 1);
        self.log(message).await;
    }

    async fn publish(&mut self) {
        let inner = Arc::clone(&self.inner);
        match inner.publish_current().await {
            Ok(None) => {}
            Ok(Some(receipt)) => {
                self.log(format!(
                    "Published catalog snapshot: {} hybrids.",
                    receipt.hybrids
                ))
                .await;
            }
            Err(err) => {
                tracing::warn!("snapshot publish failed: {}", err);
                self.log(format!("Snapshot publish failed: {err}")).await;
            }
        }
    }

    async fn finish(&mut self, status: RunStatus) {
        let message = match &self.fault {
            None => "Job succeeded.".to_string(),
            Some(err) => format!("Job failed: {err}"),
        };

        // closing line and terminal status become visible together,
        // and only once persisted
        let snapshot = {
            let mut next = self.run.read().clone();
            let now = Utc::now();
            if let Err(err) = next.log(message.clone(), now) {
                tracing::warn!("dropped log line: {}", err);
            }
            if let Err(err) = next.transition(status, now) {
                tracing::error!("{}", err);
            }
            next
        };
        tracing::info!("{}", message);
        self.persist(&snapshot).await;
        tracing::info!(
            status = %snapshot.status,
            discovered = snapshot.counts.discovered,
            added = snapshot.counts.added,
            updated = snapshot.counts.updated,
            skipped = snapshot.counts.skipped,
            errors = snapshot.counts.errors,
            "job finished"
        );
        *self.run.write() = snapshot;
    }

    /// Append a log line and persist the run
    async fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        let snapshot = {
            let mut run = self.run.write();
            if let Err(err) = run.log(message.clone(), Utc::now()) {
                tracing::warn!("dropped log line: {}", err);
                return;
            }
            run.clone()
        };
        tracing::info!("{}", message);
        self.persist(&snapshot).await;
    }

    async fn persist(&mut self, run: &Run) {
        if let Err(err) = self.inner.store.record_run(run).await {
            tracing::error!("failed to persist run: {}", err);
            let err = CatalogError::from(err);
            if err.is_job_fatal() {
                self.fault.get_or_insert(err);
            }
        }
    }

    fn update_counts(&self, f: impl FnOnce(&mut RunCounts)) {
        f(&mut self.run.write().counts);
    }
}
