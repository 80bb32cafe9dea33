//! Parostok catalog server
//!
//! Wires configuration, storage and the orchestrator together and exposes
//! them over HTTP:
//!
//! | route | purpose |
//! |---|---|
//! | `POST /update` | start an update job |
//! | `GET /update/{job_id}` | job status and audit log |
//! | `GET /catalog` | current catalog, optionally `?market=UA` |
//! | `GET /catalog/sources` | source registry and the latest run |
//! | `POST /manual-import` | load provenance-complete attributes |
//! | `GET /health` | liveness |

#![warn(unreachable_pub)]

pub mod api;
pub mod app;
pub mod telemetry;

pub use api::{routes, ApiError};
pub use app::{App, AppError, Storage};
pub use telemetry::init_tracing;
