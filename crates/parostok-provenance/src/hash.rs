//! Evidence hashing primitives
//!
//! Provides [`EvidenceHash`], a strongly-typed 32-byte SHA-256 digest over an
//! attribute's (value, evidence) pair. The store recomputes it on every
//! write, so a caller-supplied hash that disagrees with the content is
//! detected before anything is persisted.

use crate::attribute::AttributeValue;
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Domain separator mixed into every evidence digest
const DOMAIN: &[u8] = b"parostok.evidence.v1";

/// A 32-byte evidence hash (SHA-256)
///
/// Immutable and cheap to clone (Copy). Rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EvidenceHash([u8; 32]);

impl EvidenceHash {
    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Compute the digest for a (value, evidence) pair
    ///
    /// Each component is tagged and length-prefixed, so `Text("1")` and
    /// `Integer(1)` never collide, and neither does a value/evidence split
    /// at a different boundary.
    #[must_use]
    pub fn compute(value: Option<&AttributeValue>, evidence: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN);
        match value {
            None => hasher.update([0u8]),
            Some(AttributeValue::Integer(i)) => {
                hasher.update([1u8]);
                hasher.update(i.to_le_bytes());
            }
            Some(AttributeValue::Text(s)) => {
                hasher.update([2u8]);
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
        match evidence {
            None => hasher.update([0u8]),
            Some(e) => {
                hasher.update([1u8]);
                hasher.update((e.len() as u64).to_le_bytes());
                hasher.update(e.as_bytes());
            }
        }
        Self(hasher.finalize().into())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for EvidenceHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for EvidenceHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for EvidenceHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EvidenceHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing evidence hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
