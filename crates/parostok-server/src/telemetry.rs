//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Filtering follows `RUST_LOG` and defaults to `info`. With `json` every
/// event is written as one JSON object per line.
///
/// # Errors
/// If a global subscriber is already installed
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}
