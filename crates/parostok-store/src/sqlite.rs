//! SQLite-backed provenance store
//!
//! A single connection behind a mutex; every call runs on the blocking
//! pool and inside one transaction, which linearizes concurrent writers.

use crate::error::StoreError;
use crate::traits::{check_run_writable, plan_upsert, ProvenanceStore, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use parostok_provenance::{
    Attribute, AttributeValue, Catalog, CatalogEntry, EvidenceHash, Hybrid, HybridDraft,
    HybridId, JobId, Market, Run, RunSummary,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Schema version recorded in `store_meta`
const SCHEMA_VERSION: i64 = 1;
/// Busy timeout for concurrent processes sharing the file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hybrids (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    market TEXT NOT NULL,
    crop TEXT NOT NULL,
    brand TEXT,
    source_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attributes (
    hybrid_id TEXT NOT NULL REFERENCES hybrids(id),
    key TEXT NOT NULL,
    value_json TEXT,
    source_url TEXT,
    evidence TEXT,
    evidence_hash TEXT,
    selector TEXT,
    extracted_at TEXT NOT NULL,
    PRIMARY KEY (hybrid_id, key),
    CHECK (value_json IS NULL OR (source_url IS NOT NULL AND evidence_hash IS NOT NULL))
);
CREATE TABLE IF NOT EXISTS runs (
    job_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    status TEXT NOT NULL,
    run_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs (started_at);
";

/// Durable store in a single SQLite file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    ///
    /// # Errors
    /// `Unavailable` if the file cannot be opened, `Corrupt` if it carries
    /// an unknown schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!("create {}: {err}", parent.display()))
            })?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection = Connection::open_with_flags(&path, flags)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        initialize_schema(&mut connection)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    /// `Unavailable` if SQLite cannot allocate the database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Database location
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            tx.execute_batch(SCHEMA)?;
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) => {
            return Err(StoreError::Corrupt(format!(
                "unsupported schema version: {v}"
            )))
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl ProvenanceStore for SqliteStore {
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
        let hybrid = Hybrid::from_draft(draft, seen_at);
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO hybrids
                    (id, name, market, crop, brand, source_url, created_at, last_seen, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    last_seen = excluded.last_seen,
                    brand = COALESCE(excluded.brand, hybrids.brand)",
                params![
                    hybrid.id.as_str(),
                    hybrid.name,
                    hybrid.market.as_str(),
                    hybrid.crop,
                    hybrid.brand,
                    hybrid.source_url,
                    timestamp(hybrid.created_at),
                ],
            )?;
            Ok(hybrid.id)
        })
        .await
    }

    async fn upsert_attribute(
        &self,
        hybrid_id: &HybridId,
        attribute: Attribute,
    ) -> Result<UpsertOutcome, StoreError> {
        let attribute = attribute.verified()?;
        let hybrid_id = hybrid_id.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let last_updated: Option<String> = tx
                .query_row(
                    "SELECT last_updated FROM hybrids WHERE id = ?1",
                    params![hybrid_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let last_updated = last_updated
                .ok_or_else(|| StoreError::NotFound(format!("hybrid {hybrid_id}")))?;

            let existing = tx
                .query_row(
                    "SELECT key, value_json, source_url, evidence, evidence_hash, selector, extracted_at
                     FROM attributes WHERE hybrid_id = ?1 AND key = ?2",
                    params![hybrid_id.as_str(), attribute.key],
                    read_attribute_row,
                )
                .optional()?
                .transpose()?;

            let (outcome, write) = plan_upsert(existing.as_ref(), attribute);
            if let Some(write) = write {
                let value_json = write
                    .value
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                tx.execute(
                    "INSERT INTO attributes
                        (hybrid_id, key, value_json, source_url, evidence, evidence_hash, selector, extracted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(hybrid_id, key) DO UPDATE SET
                        value_json = excluded.value_json,
                        source_url = excluded.source_url,
                        evidence = excluded.evidence,
                        evidence_hash = excluded.evidence_hash,
                        selector = excluded.selector,
                        extracted_at = excluded.extracted_at",
                    params![
                        hybrid_id.as_str(),
                        write.key,
                        value_json,
                        write.source_url,
                        write.evidence,
                        write.evidence_hash.map(|h| h.to_string()),
                        write.selector,
                        timestamp(write.extracted_at),
                    ],
                )?;
                let previous = parse_timestamp(&last_updated)?;
                tx.execute(
                    "UPDATE hybrids SET last_updated = ?1 WHERE id = ?2",
                    params![
                        timestamp(write.extracted_at.max(previous)),
                        hybrid_id.as_str()
                    ],
                )?;
            }
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn catalog(&self, market: Option<&Market>) -> Result<Catalog, StoreError> {
        let market = market.cloned();
        self.with_connection(move |conn| {
            let mut attributes: HashMap<String, Vec<Attribute>> = HashMap::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT hybrid_id, key, value_json, source_url, evidence, evidence_hash, selector, extracted_at
                     FROM attributes",
                )?;
                let rows = stmt.query_map([], |row| {
                    let hybrid_id: String = row.get(0)?;
                    Ok((hybrid_id, read_attribute_columns(row, 1)?))
                })?;
                for row in rows {
                    let (hybrid_id, attribute) = row?;
                    attributes.entry(hybrid_id).or_default().push(attribute?);
                }
            }

            let mut stmt = conn.prepare(
                "SELECT id, name, market, crop, brand, source_url, created_at, last_seen, last_updated
                 FROM hybrids WHERE (?1 IS NULL OR market = ?1)",
            )?;
            let rows = stmt.query_map(params![market.as_ref().map(Market::as_str)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, name, market, crop, brand, source_url, created, seen, updated) = row?;
                let hybrid = Hybrid {
                    id: HybridId::new(id.clone()),
                    name,
                    market: Market::new(market),
                    crop,
                    brand,
                    source_url,
                    created_at: parse_timestamp(&created)?,
                    last_seen: parse_timestamp(&seen)?,
                    last_updated: parse_timestamp(&updated)?,
                };
                entries.push(CatalogEntry {
                    hybrid,
                    attributes: attributes.remove(&id).unwrap_or_default(),
                });
            }
            Ok(Catalog::from_entries(entries))
        })
        .await
    }

    async fn record_run(&self, run: &Run) -> Result<(), StoreError> {
        let run = run.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let stored = load_run(&tx, run.job_id)?;
            check_run_writable(stored.as_ref(), run.job_id)?;
            let run_json =
                serde_json::to_string(&run).map_err(|err| StoreError::Corrupt(err.to_string()))?;
            tx.execute(
                "INSERT INTO runs (job_id, started_at, ended_at, status, run_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(job_id) DO UPDATE SET
                    ended_at = excluded.ended_at,
                    status = excluded.status,
                    run_json = excluded.run_json",
                params![
                    run.job_id.to_string(),
                    timestamp(run.started_at),
                    run.ended_at.map(timestamp),
                    run.status.as_str(),
                    run_json,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn run(&self, job_id: JobId) -> Result<Option<Run>, StoreError> {
        self.with_connection(move |conn| load_run(conn, job_id)).await
    }

    async fn latest_run(&self) -> Result<Option<RunSummary>, StoreError> {
        self.with_connection(|conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT run_json FROM runs ORDER BY started_at DESC, job_id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| decode_run(&j).map(|run| run.summary()))
                .transpose()
        })
        .await
    }
}

fn load_run(conn: &Connection, job_id: JobId) -> Result<Option<Run>, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT run_json FROM runs WHERE job_id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| decode_run(&j)).transpose()
}

fn decode_run(json: &str) -> Result<Run, StoreError> {
    serde_json::from_str(json).map_err(|err| StoreError::Corrupt(format!("run record: {err}")))
}

fn read_attribute_row(row: &Row<'_>) -> rusqlite::Result<Result<Attribute, StoreError>> {
    read_attribute_columns(row, 0)
}

/// Decode the seven attribute columns starting at `offset`
///
/// The outer result carries SQLite errors, the inner one decoding errors.
fn read_attribute_columns(
    row: &Row<'_>,
    offset: usize,
) -> rusqlite::Result<Result<Attribute, StoreError>> {
    let key: String = row.get(offset)?;
    let value_json: Option<String> = row.get(offset + 1)?;
    let source_url: Option<String> = row.get(offset + 2)?;
    let evidence: Option<String> = row.get(offset + 3)?;
    let evidence_hash: Option<String> = row.get(offset + 4)?;
    let selector: Option<String> = row.get(offset + 5)?;
    let extracted_at: String = row.get(offset + 6)?;

    Ok(decode_attribute(RawAttribute {
        key,
        value_json,
        source_url,
        evidence,
        evidence_hash,
        selector,
        extracted_at,
    }))
}

struct RawAttribute {
    key: String,
    value_json: Option<String>,
    source_url: Option<String>,
    evidence: Option<String>,
    evidence_hash: Option<String>,
    selector: Option<String>,
    extracted_at: String,
}

fn decode_attribute(raw: RawAttribute) -> Result<Attribute, StoreError> {
    let key = raw.key;
    let value = raw
        .value_json
        .map(|j| serde_json::from_str::<AttributeValue>(&j))
        .transpose()
        .map_err(|err| StoreError::Corrupt(format!("attribute `{key}` value: {err}")))?;
    let evidence_hash = raw
        .evidence_hash
        .map(|h| h.parse::<EvidenceHash>())
        .transpose()
        .map_err(|err| StoreError::Corrupt(format!("attribute `{key}` hash: {err}")))?;
    Ok(Attribute {
        extracted_at: parse_timestamp(&raw.extracted_at)?,
        key,
        value,
        source_url: raw.source_url,
        evidence: raw.evidence,
        evidence_hash,
        selector: raw.selector,
    })
}

/// Fixed-width RFC 3339, so text order is time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("timestamp {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parostok_provenance::{RunRequest, RunStatus};

    const URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747";

    #[tokio::test]
    async fn attributes_round_trip_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .ensure_hybrid(HybridDraft::new("ДКС 3747", "UA", "corn", URL), Utc::now())
            .await
            .unwrap();
        let rating = Attribute::observed("rating.Холодостійкість", 9_i64, URL, "Холодостійкість 9", Utc::now())
            .with_selector("regex_on_page_text");
        store.upsert_attribute(&id, rating.clone()).await.unwrap();

        let catalog = store.catalog(None).await.unwrap();
        let entry = catalog.entries().next().unwrap();
        assert_eq!(entry.attributes, vec![rating]);
    }

    #[tokio::test]
    async fn market_filter_applies() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .ensure_hybrid(HybridDraft::new("a", "UA", "corn", "https://x/a"), Utc::now())
            .await
            .unwrap();
        store
            .ensure_hybrid(HybridDraft::new("b", "US", "corn", "https://x/b"), Utc::now())
            .await
            .unwrap();
        let us = store.catalog(Some(&Market::new("US"))).await.unwrap();
        assert_eq!(us.hybrid_count(), 1);
    }

    #[tokio::test]
    async fn run_records_are_write_once_when_terminal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut run = Run::new(JobId::new(), RunRequest::new(["UA"], ["bayer_ua_dekalb"]), Utc::now());
        run.transition(RunStatus::Running, Utc::now()).unwrap();
        run.log("Starting catalog sync job.", Utc::now()).unwrap();
        store.record_run(&run).await.unwrap();
        run.transition(RunStatus::Failed, Utc::now()).unwrap();
        store.record_run(&run).await.unwrap();

        assert_eq!(store.run(run.job_id).await.unwrap(), Some(run.clone()));
        assert!(matches!(
            store.record_run(&run).await,
            Err(StoreError::AlreadyFinalized(_))
        ));
        assert_eq!(store.latest_run().await.unwrap().unwrap().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn latest_run_orders_sub_second_starts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let whole = DateTime::parse_from_rfc3339("2026-04-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = whole + chrono::Duration::milliseconds(500);

        let earlier_run = Run::new(JobId::new(), RunRequest::new(["UA"], ["a"]), whole);
        let later_run = Run::new(JobId::new(), RunRequest::new(["UA"], ["a"]), later);
        store.record_run(&later_run).await.unwrap();
        store.record_run(&earlier_run).await.unwrap();

        let latest = store.latest_run().await.unwrap().unwrap();
        assert_eq!(latest.job_id, later_run.job_id);
        assert_eq!(latest.started_at, later);
        assert_eq!(timestamp(whole).len(), timestamp(later).len());
    }

    #[tokio::test]
    async fn unknown_hybrid_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let attr = Attribute::observed("fao", "260", URL, "ФАО: 260", Utc::now());
        let result = store.upsert_attribute(&HybridId::new("missing"), attr).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
