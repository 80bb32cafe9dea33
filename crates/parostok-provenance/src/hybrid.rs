//! Hybrids (catalog entries) and markets

use crate::attribute::Attribute;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Market code, e.g. `UA` or `US`
///
/// Normalized to trimmed upper case on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Market(String);

impl Market {
    /// Create normalized market code
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Market code as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code is empty after normalization
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Market {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Market {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Market> for String {
    fn from(value: Market) -> Self {
        value.0
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable hybrid identifier
///
/// Derived from (market, name, source_url) so repeated observations of the
/// same product page map onto the same hybrid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HybridId(String);

impl HybridId {
    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier for a product observation
    #[must_use]
    pub fn derive(market: &Market, name: &str, source_url: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [market.as_str(), name.trim(), source_url.trim()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        Self(format!(
            "{}-{}",
            market.as_str().to_ascii_lowercase(),
            hex::encode(&digest[..8])
        ))
    }

    /// Identifier as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HybridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity fields of an observed product, before it has an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridDraft {
    /// Display name
    pub name: String,
    /// Market the product is sold in
    pub market: Market,
    /// Crop, e.g. `corn`
    pub crop: String,
    /// Brand, e.g. `DEKALB (Bayer)`
    #[serde(default)]
    pub brand: Option<String>,
    /// Product page
    pub source_url: String,
}

impl HybridDraft {
    /// Create a draft
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        market: impl Into<Market>,
        crop: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            market: market.into(),
            crop: crop.into(),
            brand: None,
            source_url: source_url.into(),
        }
    }

    /// With brand
    #[inline]
    #[must_use]
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Identifier this draft resolves to
    #[inline]
    #[must_use]
    pub fn id(&self) -> HybridId {
        HybridId::derive(&self.market, &self.name, &self.source_url)
    }

    /// Whether the identity fields are usable
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.market.is_blank()
            && !self.source_url.trim().is_empty()
    }
}

/// Catalog entry (variety)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hybrid {
    /// Stable identifier
    pub id: HybridId,
    /// Display name
    pub name: String,
    /// Market
    pub market: Market,
    /// Crop
    pub crop: String,
    /// Brand
    #[serde(default)]
    pub brand: Option<String>,
    /// Product page
    pub source_url: String,
    /// When the hybrid was first recorded
    pub created_at: DateTime<Utc>,
    /// When an adapter last observed it
    pub last_seen: DateTime<Utc>,
    /// When one of its attributes last changed
    pub last_updated: DateTime<Utc>,
}

impl Hybrid {
    /// Materialize a draft observed at `now`
    #[must_use]
    pub fn from_draft(draft: HybridDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id(),
            name: draft.name.trim().to_string(),
            market: draft.market,
            crop: draft.crop,
            brand: draft.brand,
            source_url: draft.source_url,
            created_at: now,
            last_seen: now,
            last_updated: now,
        }
    }
}

/// Hybrid together with its attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The hybrid
    #[serde(flatten)]
    pub hybrid: Hybrid,
    /// Attributes ordered by key
    pub attributes: Vec<Attribute>,
}
