//! Parostok provenance model
//!
//! Types shared by every layer of the catalog:
//!
//! - [`Attribute`]: one fact with its provenance (source URL, evidence,
//!   [`EvidenceHash`], extraction time)
//! - [`Hybrid`] / [`CatalogEntry`] / [`Catalog`]: the catalog itself
//! - [`Source`]: a registry entry gated by its enabled flag
//! - [`Run`]: one update job with its status machine and audit log
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use parostok_provenance::Attribute;
//!
//! let attr = Attribute::observed(
//!     "fao",
//!     "260",
//!     "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747",
//!     "ФАО: 260",
//!     Utc::now(),
//! );
//! assert!(attr.verified().is_ok());
//! ```

#![warn(unreachable_pub)]

mod attribute;
mod catalog;
mod error;
mod hash;
mod hybrid;
mod run;
mod source;

pub use attribute::{evidence_snippet, Attribute, AttributeValue, MAX_EVIDENCE_CHARS};
pub use catalog::Catalog;
pub use error::{ProvenanceError, RunError};
pub use hash::{EvidenceHash, HashError};
pub use hybrid::{CatalogEntry, Hybrid, HybridDraft, HybridId, Market};
pub use run::{
    validate_transition, JobId, Run, RunCounts, RunRequest, RunStatus, RunSummary, StepLog,
};
pub use source::{Source, SourceId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
