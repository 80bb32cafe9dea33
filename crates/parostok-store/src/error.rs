//! Store error types

use parostok_provenance::{JobId, ProvenanceError};

/// Errors raised by [`ProvenanceStore`](crate::ProvenanceStore) backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Attribute rejected by the truthfulness contract
    /// (`InvalidProvenance` or `HashMismatch`)
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    /// Hybrid identity fields are unusable
    #[error("invalid hybrid: {0}")]
    InvalidHybrid(String),

    /// Attempted mutation of a terminal run
    #[error("run {0} is already finalized")]
    AlreadyFinalized(JobId),

    /// Unknown hybrid or run
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend cannot serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data could not be decoded
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the failure is infrastructure-level rather than scoped to
    /// the record being written
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Corrupt(_))
    }

    /// Whether the error is a provenance rejection
    #[inline]
    #[must_use]
    pub fn is_provenance(&self) -> bool {
        matches!(self, Self::Provenance(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Unavailable(format!("store task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::Unavailable("db locked".into()).is_infrastructure());
        assert!(StoreError::Corrupt("bad json".into()).is_infrastructure());
        assert!(!StoreError::NotFound("h".into()).is_infrastructure());
        let prov: StoreError = ProvenanceError::invalid("fao", "no url").into();
        assert!(prov.is_provenance());
        assert!(prov.to_string().contains("invalid provenance"));
    }
}
