//! Provenance-backed attributes
//!
//! An [`Attribute`] is one fact about a hybrid. A non-null value is only
//! acceptable together with the URL it came from, the verbatim evidence
//! snippet, and the hash binding the two.

use crate::error::ProvenanceError;
use crate::hash::EvidenceHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length (in characters) of a stored evidence snippet
pub const MAX_EVIDENCE_CHARS: usize = 240;

/// Attribute value as observed on the source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Whole number (ratings, FAO numbers when typed)
    Integer(i64),
    /// Free text, stored verbatim
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One provenance-backed fact about a hybrid
///
/// `value == None` means "unknown". It is never a stand-in for zero or
/// "not applicable".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Semantic name, e.g. `maturity_group` or `rating.Холодостійкість`
    pub key: String,
    /// Observed value
    #[serde(default)]
    pub value: Option<AttributeValue>,
    /// Page the value was read from
    #[serde(default)]
    pub source_url: Option<String>,
    /// Verbatim snippet substantiating the value
    #[serde(default)]
    pub evidence: Option<String>,
    /// Hash over (value, evidence)
    #[serde(default)]
    pub evidence_hash: Option<EvidenceHash>,
    /// Extraction method, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// When the value was acquired
    pub extracted_at: DateTime<Utc>,
}

impl Attribute {
    /// Build an observed attribute with its evidence hash computed
    #[must_use]
    pub fn observed(
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
        source_url: impl Into<String>,
        evidence: impl Into<String>,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        let value = value.into();
        let evidence = evidence_snippet(&evidence.into());
        let hash = EvidenceHash::compute(Some(&value), Some(&evidence));
        Self {
            key: key.into(),
            value: Some(value),
            source_url: Some(source_url.into()),
            evidence: Some(evidence),
            evidence_hash: Some(hash),
            selector: None,
            extracted_at,
        }
    }

    /// Build an explicit "unknown" attribute
    #[must_use]
    pub fn unknown(key: impl Into<String>, extracted_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: None,
            source_url: None,
            evidence: None,
            evidence_hash: None,
            selector: None,
            extracted_at,
        }
    }

    /// With extraction selector
    #[inline]
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Hash the content currently carries, if it carries any
    #[inline]
    #[must_use]
    pub fn recompute_hash(&self) -> Option<EvidenceHash> {
        if self.value.is_none() && self.evidence.is_none() {
            return None;
        }
        Some(EvidenceHash::compute(
            self.value.as_ref(),
            self.evidence.as_deref(),
        ))
    }

    /// Check the truthfulness contract and return the normalized attribute
    ///
    /// The returned attribute always carries the recomputed hash.
    ///
    /// # Errors
    /// - `InvalidProvenance` if the key is blank, a value lacks source
    ///   URL, evidence or evidence hash, or a hash covers no content
    /// - `HashMismatch` if a supplied hash disagrees with the content
    pub fn verified(mut self) -> Result<Self, ProvenanceError> {
        if is_blank(Some(self.key.as_str())) {
            return Err(ProvenanceError::invalid("", "attribute key is empty"));
        }

        if self.value.is_some() {
            if is_blank(self.source_url.as_deref()) {
                return Err(ProvenanceError::invalid(&self.key, "value without source_url"));
            }
            if is_blank(self.evidence.as_deref()) {
                return Err(ProvenanceError::invalid(&self.key, "value without evidence"));
            }
            if self.evidence_hash.is_none() {
                return Err(ProvenanceError::invalid(
                    &self.key,
                    "value without evidence_hash",
                ));
            }
        }

        let computed = self.recompute_hash();
        match (self.evidence_hash, computed) {
            (Some(_), None) => {
                return Err(ProvenanceError::invalid(
                    &self.key,
                    "evidence_hash without value or evidence",
                ));
            }
            (Some(supplied), Some(computed)) if supplied != computed => {
                return Err(ProvenanceError::HashMismatch {
                    key: self.key,
                    supplied,
                    computed,
                });
            }
            _ => {}
        }

        self.evidence_hash = computed;
        Ok(self)
    }

    /// Whether two attributes assert the same fact from the same place
    #[inline]
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.key == other.key
            && self.value == other.value
            && self.source_url == other.source_url
            && self.evidence_hash == other.evidence_hash
    }

    /// Whether this attribute satisfies the stored-record invariant
    #[inline]
    #[must_use]
    pub fn is_truthful(&self) -> bool {
        self.value.is_none() || (self.source_url.is_some() && self.evidence_hash.is_some())
    }
}

/// Trim and cap an evidence snippet to [`MAX_EVIDENCE_CHARS`]
#[must_use]
pub fn evidence_snippet(raw: &str) -> String {
    raw.trim().chars().take(MAX_EVIDENCE_CHARS).collect()
}

fn is_blank(s: Option<&str>) -> bool {
    s.map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    const URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747";

    #[test]
    fn observed_attribute_is_verified() {
        let attr = Attribute::observed("fao", "260", URL, "ФАО: 260", at());
        let verified = attr.clone().verified().unwrap();
        assert_eq!(verified, attr);
        assert!(verified.is_truthful());
    }

    #[test]
    fn value_without_source_url_rejected() {
        let mut attr = Attribute::observed("fao", "260", URL, "ФАО: 260", at());
        attr.source_url = None;
        let err = attr.verified().unwrap_err();
        assert!(matches!(err, ProvenanceError::InvalidProvenance { .. }));
    }

    #[test]
    fn value_without_hash_rejected() {
        let mut attr = Attribute::observed("fao", "260", URL, "ФАО: 260", at());
        attr.evidence_hash = None;
        assert!(matches!(
            attr.verified(),
            Err(ProvenanceError::InvalidProvenance { .. })
        ));
    }

    #[test]
    fn value_with_blank_evidence_rejected() {
        let mut attr = Attribute::observed("fao", "260", URL, "ФАО: 260", at());
        attr.evidence = Some("   ".into());
        assert!(matches!(
            attr.verified(),
            Err(ProvenanceError::InvalidProvenance { .. })
        ));
    }

    #[test]
    fn tampered_value_is_hash_mismatch() {
        let mut attr = Attribute::observed("fao", "260", URL, "ФАО: 260", at());
        attr.value = Some(AttributeValue::Text("300".into()));
        assert!(matches!(
            attr.verified(),
            Err(ProvenanceError::HashMismatch { .. })
        ));
    }

    #[test]
    fn unknown_attribute_needs_no_provenance() {
        let attr = Attribute::unknown("trait_package", at()).verified().unwrap();
        assert!(attr.value.is_none());
        assert!(attr.evidence_hash.is_none());
    }

    #[test]
    fn unknown_with_evidence_gets_hash() {
        let mut attr = Attribute::unknown("fao", at());
        attr.evidence = Some("ФАО: —".into());
        let attr = attr.verified().unwrap();
        assert!(attr.evidence_hash.is_some());
    }

    #[test]
    fn hash_over_nothing_rejected() {
        let hash = Attribute::observed("fao", "260", URL, "ФАО: 260", at()).evidence_hash;
        let mut attr = Attribute::unknown("fao", at());
        attr.evidence_hash = hash;
        let err = attr.verified().unwrap_err();
        assert!(matches!(err, ProvenanceError::InvalidProvenance { .. }), "{err:?}");
    }

    #[test]
    fn blank_key_rejected() {
        let attr = Attribute::observed("  ", "x", URL, "x", at());
        assert!(attr.verified().is_err());
    }

    #[test]
    fn evidence_is_capped() {
        let long = "а".repeat(500);
        let attr = Attribute::observed("advantages_text", "x", URL, long, at());
        assert_eq!(attr.evidence.unwrap().chars().count(), MAX_EVIDENCE_CHARS);
    }

    #[test]
    fn value_serializes_untagged() {
        let json = serde_json::to_string(&AttributeValue::Integer(9)).unwrap();
        assert_eq!(json, "9");
        let back: AttributeValue = serde_json::from_str("\"зубовидний\"").unwrap();
        assert_eq!(back, AttributeValue::Text("зубовидний".into()));
    }
}
