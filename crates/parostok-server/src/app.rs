//! Process wiring: configuration to a running orchestrator

use crate::api;
use parostok_core::{AdapterError, AdapterSet, CatalogConfig, ConfigError, Orchestrator};
use parostok_store::{MemoryStore, ProvenanceStore, SnapshotPublisher, SqliteStore, StoreError};
use std::net::SocketAddr;
use std::sync::Arc;

/// Where catalog state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// SQLite file at `database_path`
    #[default]
    Sqlite,
    /// Process memory, lost on exit
    Memory,
}

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database could not be opened
    #[error(transparent)]
    Store(#[from] StoreError),

    /// HTTP client for the adapters could not be built
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Listen address unavailable
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: warp::Error,
    },
}

/// Configured catalog service
#[derive(Debug, Clone)]
pub struct App {
    config: Arc<CatalogConfig>,
    orchestrator: Orchestrator,
}

impl App {
    /// Build the service from configuration
    ///
    /// # Errors
    /// Config validation, database open, or adapter client construction
    pub fn new(config: CatalogConfig, storage: Storage) -> Result<Self, AppError> {
        config.validate()?;
        let registry = Arc::new(config.registry()?);
        let store: Arc<dyn ProvenanceStore> = match storage {
            Storage::Sqlite => Arc::new(SqliteStore::open(&config.database_path)?),
            Storage::Memory => Arc::new(MemoryStore::new()),
        };
        let orchestrator = Orchestrator::builder(registry, store)
            .adapters(AdapterSet::builtin(config.adapter_timeout())?)
            .publisher(SnapshotPublisher::new(config.snapshot_path.clone()))
            .adapter_timeout(config.adapter_timeout())
            .build();

        tracing::info!(
            sources = orchestrator.registry().len(),
            storage = ?storage,
            "catalog service configured"
        );
        Ok(Self {
            config: Arc::new(config),
            orchestrator,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Orchestrator in use
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Publish the startup snapshot, then serve HTTP until Ctrl-C
    ///
    /// A failed startup snapshot is logged; the server still starts.
    ///
    /// # Errors
    /// `Bind` if the listen address is unavailable
    pub async fn serve(self) -> Result<(), AppError> {
        match self.orchestrator.publish_snapshot().await {
            Ok(Some(receipt)) => tracing::info!(
                "Startup snapshot: {} hybrids at {}",
                receipt.hybrids,
                receipt.path.display()
            ),
            Ok(None) => {}
            Err(err) => tracing::error!("Startup snapshot failed: {}", err),
        }

        let addr = self.config.bind;
        let routes = api::routes(self.orchestrator.clone(), Arc::clone(&self.config));
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown_signal())
            .map_err(|source| AppError::Bind { addr, source })?;

        tracing::info!("Listening on http://{}", bound);
        server.await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
