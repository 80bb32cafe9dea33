//! Error types for the catalog core
//!
//! Job-scoped failures (a disabled source, a failing adapter, a rejected
//! attribute) are recovered inside the job and end up in its step log.
//! Only [`CatalogError::is_job_fatal`] errors turn a job `failed`.

use parostok_provenance::{JobId, ProvenanceError, SourceId};
use parostok_store::{SnapshotError, StoreError};
use std::path::PathBuf;
use std::time::Duration;

/// Main catalog error type
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Attribute violates the truthfulness contract
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Registry lookup or validation failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Source skipped by the compliance gate
    #[error("source {id} disabled: {reason}")]
    SourceDisabled {
        /// Source
        id: SourceId,
        /// Operator-facing reason
        reason: String,
    },

    /// Adapter failed for one source
    #[error("source {id} failed: {error}")]
    AdapterFailure {
        /// Source
        id: SourceId,
        /// Underlying adapter error
        #[source]
        error: AdapterError,
    },

    /// Snapshot could not be published
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Structurally invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown job
    #[error("job not found: {0}")]
    JobNotFound(JobId),
}

impl CatalogError {
    /// Whether the error prevents any reliable progress for a job
    #[inline]
    #[must_use]
    pub fn is_job_fatal(&self) -> bool {
        match self {
            Self::Store(err) => err.is_infrastructure(),
            Self::InvalidRequest(_) => true,
            _ => false,
        }
    }

    /// Whether resubmitting the same work may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => matches!(err, StoreError::Unavailable(_)),
            Self::AdapterFailure { error, .. } => error.is_transient(),
            Self::Snapshot(SnapshotError::Io { .. }) => true,
            _ => false,
        }
    }

    /// Whether the caller sent bad data rather than hitting a server fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Provenance(_) | Self::InvalidRequest(_) => true,
            Self::Store(err) => err.is_provenance() || matches!(err, StoreError::InvalidHybrid(_)),
            _ => false,
        }
    }
}

/// Source registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Unknown source id
    #[error("unknown source: {0}")]
    NotFound(SourceId),

    /// A disabled source has no reason
    #[error("source {0} is disabled without a reason")]
    MissingReason(SourceId),

    /// Two entries share an id
    #[error("duplicate source: {0}")]
    DuplicateSource(SourceId),

    /// Blank id or market
    #[error("source entry {index} has a blank id or market")]
    BlankIdentity {
        /// Position in the registry table
        index: usize,
    },
}

/// Adapter failures, always scoped to one source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Transport failure or non-success status
    #[error("network error: {0}")]
    Network(String),

    /// Page did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// Adapter exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    /// Whether a later run may succeed without changes
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for AdapterError {
    fn from(err: url::ParseError) -> Self {
        Self::Parse(format!("bad url: {err}"))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`CatalogConfig`](crate::CatalogConfig)
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Source table violates registry rules
    #[error("invalid source table: {0}")]
    Registry(#[from] RegistryError),

    /// A value is out of range
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}
