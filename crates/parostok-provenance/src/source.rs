//! Catalog sources

use crate::hybrid::Market;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source identifier, e.g. `bayer_ua_dekalb`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or whitespace
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registry entry
///
/// A disabled source always carries the operator-facing reason; the
/// registry refuses to load one without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Identifier
    pub id: SourceId,
    /// Market the source covers
    pub market: Market,
    /// Compliance gate
    pub enabled: bool,
    /// Why the source is disabled
    #[serde(default)]
    pub reason: Option<String>,
    /// Attribute keys the source is expected to produce
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Source {
    /// Enabled source
    #[must_use]
    pub fn enabled(id: impl Into<SourceId>, market: impl Into<Market>) -> Self {
        Self {
            id: id.into(),
            market: market.into(),
            enabled: true,
            reason: None,
            fields: Vec::new(),
        }
    }

    /// Disabled source with its reason
    #[must_use]
    pub fn disabled(
        id: impl Into<SourceId>,
        market: impl Into<Market>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            market: market.into(),
            enabled: false,
            reason: Some(reason.into()),
            fields: Vec::new(),
        }
    }

    /// With expected fields
    #[inline]
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Disablement reason, if the source is disabled
    #[inline]
    #[must_use]
    pub fn disablement_reason(&self) -> Option<&str> {
        if self.enabled {
            None
        } else {
            self.reason.as_deref()
        }
    }

    /// Whether a disabled source is missing its reason
    #[inline]
    #[must_use]
    pub fn lacks_reason(&self) -> bool {
        !self.enabled && self.reason.as_deref().map_or(true, |r| r.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_reason_surfaces() {
        let src = Source::disabled("bayer_ua_dekalb", "UA", "ToS pending");
        assert_eq!(src.disablement_reason(), Some("ToS pending"));
        assert!(!src.lacks_reason());
    }

    #[test]
    fn enabled_source_has_no_reason() {
        let src = Source::enabled("bayer_ua_dekalb", "UA");
        assert_eq!(src.disablement_reason(), None);
        assert!(!src.lacks_reason());
    }

    #[test]
    fn blank_reason_detected() {
        let src = Source::disabled("x", "US", "  ");
        assert!(src.lacks_reason());
    }
}
