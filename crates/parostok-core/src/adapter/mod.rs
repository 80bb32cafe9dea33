//! Source adapters
//!
//! An adapter turns one registry [`Source`] into candidate hybrids with
//! observed attributes. Adapters never decide whether they may run; the
//! orchestrator only calls them for enabled sources.

mod dekalb_ua;
mod text;

pub use dekalb_ua::{
    discover_catalog_pages, discover_product_pages, parse_product, DekalbUaAdapter,
    DEKALB_UA_SOURCE, SELECTOR_PAGE_TEXT,
};
pub use text::html_to_text;

use crate::error::AdapterError;
use async_trait::async_trait;
use parostok_provenance::{Attribute, HybridDraft, Source, SourceId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One product observed by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Identity of the product
    pub draft: HybridDraft,
    /// Attributes positively observed on the product page
    pub attributes: Vec<Attribute>,
}

impl Candidate {
    /// Create candidate
    #[inline]
    #[must_use]
    pub fn new(draft: HybridDraft, attributes: Vec<Attribute>) -> Self {
        Self { draft, attributes }
    }
}

/// Everything one adapter run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOutput {
    /// Listing pages visited
    pub catalog_pages: usize,
    /// Product pages discovered
    pub discovered: usize,
    /// Parsed products
    pub candidates: Vec<Candidate>,
}

impl AdapterOutput {
    /// Output for a fixed candidate list
    #[must_use]
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            catalog_pages: 0,
            discovered: candidates.len(),
            candidates,
        }
    }

    /// Total attributes across all candidates
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.candidates.iter().map(|c| c.attributes.len()).sum()
    }
}

/// Source-specific fetch logic
#[async_trait]
pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    /// Registry id this adapter serves
    fn source_id(&self) -> SourceId;

    /// Fetch and parse everything the source currently publishes
    async fn fetch(&self, source: &Source) -> Result<AdapterOutput, AdapterError>;
}

/// Adapters keyed by the registry id they serve
#[derive(Debug, Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl AdapterSet {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set with every adapter this crate ships
    ///
    /// # Errors
    /// `Network` if the HTTP client cannot be built
    pub fn builtin(request_timeout: Duration) -> Result<Self, AdapterError> {
        let mut set = Self::new();
        set.register(Arc::new(DekalbUaAdapter::new(request_timeout)?));
        Ok(set)
    }

    /// Add or replace the adapter for its source id
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        self.adapters.insert(adapter.source_id(), adapter);
        self
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapter for a source
    #[inline]
    #[must_use]
    pub fn get(&self, id: &SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(id).cloned()
    }

    /// Number of adapters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
