//! Catalog configuration
//!
//! Loaded from TOML; every field is optional and falls back to
//! [`CatalogConfig::default`].
//!
//! ```toml
//! bind = "0.0.0.0:8000"
//! adapter_timeout_secs = 45
//!
//! [[sources]]
//! id = "bayer_ua_dekalb"
//! market = "UA"
//! enabled = false
//! reason = "ToS pending"
//! ```

use crate::error::ConfigError;
use crate::registry::{builtin_sources, SourceRegistry};
use parostok_provenance::{Market, RunRequest, Source, SourceId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// HTTP listen address
    pub bind: SocketAddr,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Fallback snapshot location
    pub snapshot_path: PathBuf,
    /// Budget for one adapter invocation
    pub adapter_timeout_secs: u64,
    /// Markets used when a request omits them
    pub default_markets: Vec<Market>,
    /// Sources used when a request omits them
    pub default_sources: Vec<SourceId>,
    /// Registry table
    pub sources: Vec<Source>,
}

impl CatalogConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML file
    ///
    /// # Errors
    /// `Io`, `Parse`, or a validation error from [`validate`](Self::validate)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// See [`load`](Self::load)
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the registry table
    ///
    /// # Errors
    /// `Invalid` for out-of-range values, `Registry` for a bad source table
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "adapter_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        self.registry()?;
        Ok(())
    }

    /// Build the source registry from the table
    ///
    /// # Errors
    /// `Registry` if the table violates registry rules
    pub fn registry(&self) -> Result<SourceRegistry, ConfigError> {
        Ok(SourceRegistry::from_sources(self.sources.iter().cloned())?)
    }

    /// Adapter timeout as a duration
    #[inline]
    #[must_use]
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// Fill omitted request fields from the defaults
    #[must_use]
    pub fn resolve_request(
        &self,
        markets: Option<Vec<Market>>,
        sources: Option<Vec<SourceId>>,
        dry_run: bool,
    ) -> RunRequest {
        RunRequest {
            markets: markets.unwrap_or_else(|| self.default_markets.clone()),
            sources: sources.unwrap_or_else(|| self.default_sources.clone()),
            dry_run,
        }
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// With database path
    #[inline]
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// With snapshot path
    #[inline]
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// With adapter timeout
    #[inline]
    #[must_use]
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With registry table
    #[inline]
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            database_path: PathBuf::from("data/catalog.db"),
            snapshot_path: PathBuf::from("frontend/public/catalog_fallback.json"),
            adapter_timeout_secs: 30,
            default_markets: vec![Market::new("UA"), Market::new("US")],
            default_sources: vec![
                SourceId::new("bayer_ua_dekalb"),
                SourceId::new("bayer_us_dekalb"),
            ],
            sources: builtin_sources(),
        }
    }
}
