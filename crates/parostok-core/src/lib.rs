//! Parostok catalog core
//!
//! The update pipeline:
//!
//! - [`SourceRegistry`]: which sources exist and which may run, with the
//!   reason for every disabled one
//! - [`SourceAdapter`]: source-specific fetch logic, selected by registry id
//! - [`Orchestrator`]: runs update jobs as background tasks and exposes
//!   their status and audit log
//! - [`ManualImport`]: operator-supplied attributes, all-or-nothing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use parostok_core::{AdapterSet, CatalogConfig, Orchestrator};
//! use parostok_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CatalogConfig::new();
//! let orchestrator = Orchestrator::builder(
//!     Arc::new(config.registry()?),
//!     Arc::new(MemoryStore::new()),
//! )
//! .adapters(AdapterSet::builtin(config.adapter_timeout())?)
//! .build();
//!
//! let job = orchestrator.submit(config.resolve_request(None, None, false));
//! let run = orchestrator.wait(job, Duration::from_millis(200)).await?;
//! println!("{}: {} log lines", run.status, run.step_logs.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod import;
pub mod orchestrator;
pub mod registry;

pub use adapter::{AdapterOutput, AdapterSet, Candidate, DekalbUaAdapter, SourceAdapter};
pub use config::CatalogConfig;
pub use error::{AdapterError, CatalogError, ConfigError, RegistryError};
pub use import::{ImportItem, ImportReport, ManualImport};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, SourceStatus, SourcesOverview, DEFAULT_ADAPTER_TIMEOUT,
};
pub use registry::{builtin_sources, SourceRegistry, MANUAL_IMPORT_ONLY};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the catalog core
    pub use crate::{
        AdapterSet, CatalogConfig, CatalogError, Orchestrator, SourceAdapter, SourceRegistry,
    };
    pub use parostok_provenance::{Attribute, JobId, Run, RunRequest, RunStatus, Source};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
