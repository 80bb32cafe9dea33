//! Source registry
//!
//! The compliance gate. The orchestrator receives a registry instance and
//! never consults any other switch when deciding whether a source may run.
//! Registries are immutable once built; reloading configuration builds a
//! new one.

use crate::error::RegistryError;
use indexmap::IndexMap;
use parostok_provenance::{Source, SourceId};

/// Reason shipped with the built-in US source
pub const MANUAL_IMPORT_ONLY: &str =
    "Network scraping not configured in this starter; use manual import.";

/// Ordered, validated set of sources
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: IndexMap<SourceId, Source>,
}

impl SourceRegistry {
    /// Build a registry, preserving input order
    ///
    /// # Errors
    /// - `BlankIdentity` for an entry with an empty id or market
    /// - `MissingReason` for a disabled source without a reason
    /// - `DuplicateSource` if an id appears twice
    pub fn from_sources(sources: impl IntoIterator<Item = Source>) -> Result<Self, RegistryError> {
        let mut map = IndexMap::new();
        for (index, source) in sources.into_iter().enumerate() {
            if source.id.is_blank() || source.market.is_blank() {
                return Err(RegistryError::BlankIdentity { index });
            }
            if source.lacks_reason() {
                return Err(RegistryError::MissingReason(source.id));
            }
            if map.contains_key(&source.id) {
                return Err(RegistryError::DuplicateSource(source.id));
            }
            map.insert(source.id.clone(), source);
        }
        Ok(Self { sources: map })
    }

    /// The sources this catalog ships with
    #[must_use]
    pub fn builtin() -> Self {
        let sources = builtin_sources()
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        Self { sources }
    }

    /// All sources in registry order
    #[inline]
    pub fn list(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Look up a source
    ///
    /// # Errors
    /// `NotFound` for an unknown id
    pub fn get(&self, id: &SourceId) -> Result<&Source, RegistryError> {
        self.sources
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Whether the source exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    /// Whether the source exists and is enabled
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, id: &SourceId) -> bool {
        self.sources.get(id).is_some_and(|s| s.enabled)
    }

    /// Number of sources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Built-in registry table
#[must_use]
pub fn builtin_sources() -> Vec<Source> {
    vec![
        Source::enabled("bayer_ua_dekalb", "UA").with_fields([
            "name",
            "fao",
            "grain_type",
            "maturity_group",
            "advantages_text",
            "positioning.*",
            "density.*",
            "rating.*",
        ]),
        Source::disabled("bayer_us_dekalb", "US", MANUAL_IMPORT_ONLY).with_fields([
            "name",
            "relative_maturity",
            "trait_package",
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid_and_ordered() {
        let registry = SourceRegistry::builtin();
        let rebuilt = SourceRegistry::from_sources(builtin_sources()).unwrap();
        let ids: Vec<_> = registry.list().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["bayer_ua_dekalb", "bayer_us_dekalb"]);
        assert_eq!(rebuilt.len(), registry.len());
        assert!(registry.is_enabled(&SourceId::new("bayer_ua_dekalb")));
        assert!(!registry.is_enabled(&SourceId::new("bayer_us_dekalb")));
    }

    #[test]
    fn disabled_without_reason_rejected() {
        let mut src = Source::disabled("bayer_ua_dekalb", "UA", "ToS pending");
        src.reason = Some("   ".into());
        assert_eq!(
            SourceRegistry::from_sources([src]).unwrap_err(),
            RegistryError::MissingReason(SourceId::new("bayer_ua_dekalb"))
        );
    }

    #[test]
    fn duplicates_rejected() {
        let err = SourceRegistry::from_sources([
            Source::enabled("a", "UA"),
            Source::enabled("a", "US"),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateSource(SourceId::new("a")));
    }

    #[test]
    fn unknown_lookup() {
        let registry = SourceRegistry::builtin();
        assert!(matches!(
            registry.get(&SourceId::new("nope")),
            Err(RegistryError::NotFound(_))
        ));
        assert!(!registry.is_enabled(&SourceId::new("nope")));
    }
}
