//! Error types for the provenance model
//!
//! Two families:
//! - [`ProvenanceError`]: an attribute violates the truthfulness contract
//! - [`RunError`]: an illegal job lifecycle transition

use crate::hash::EvidenceHash;
use crate::run::{JobId, RunStatus};

/// Attribute provenance violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    /// A value is present without full provenance
    #[error("invalid provenance for `{key}`: {reason}")]
    InvalidProvenance {
        /// Attribute key
        key: String,
        /// What is missing
        reason: String,
    },

    /// The supplied evidence hash does not match the content
    #[error("hash mismatch for `{key}`: supplied {supplied}, computed {computed}")]
    HashMismatch {
        /// Attribute key
        key: String,
        /// Hash supplied by the caller
        supplied: EvidenceHash,
        /// Hash recomputed from (value, evidence)
        computed: EvidenceHash,
    },
}

impl ProvenanceError {
    /// Shorthand for an `InvalidProvenance` error
    #[inline]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProvenance {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Attribute key the error refers to
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::InvalidProvenance { key, .. } | Self::HashMismatch { key, .. } => key,
        }
    }
}

/// Job lifecycle violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Transition not permitted by the state machine
    #[error("illegal run transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: RunStatus,
        /// Requested status
        to: RunStatus,
    },

    /// The run already reached a terminal status
    #[error("run {0} is already finalized")]
    AlreadyFinalized(JobId),
}
