//! Parostok storage
//!
//! [`ProvenanceStore`] is the capability the orchestrator and the HTTP
//! surface depend on. Two backends implement it:
//!
//! - [`SqliteStore`]: durable, single file, the default for servers
//! - [`MemoryStore`]: process-local, for tests and throwaway runs
//!
//! Both enforce the same write rules: an attribute reaches storage only
//! after [`Attribute::verified`](parostok_provenance::Attribute::verified)
//! accepts it, and a terminal run is never rewritten.
//!
//! [`SnapshotPublisher`] turns a [`Catalog`](parostok_provenance::Catalog)
//! into the static fallback file served to the frontend.

#![warn(unreachable_pub)]

mod error;
mod memory;
mod snapshot;
mod sqlite;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use snapshot::{SnapshotError, SnapshotPublisher, SnapshotReceipt};
pub use sqlite::SqliteStore;
pub use traits::{ProvenanceStore, UpsertOutcome};
