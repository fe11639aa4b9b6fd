//! Tracing setup for a host process embedding this crate. Not wired into
//! any node handler directly — node handlers just emit `tracing` events,
//! and whoever runs the supervisor decides how those get collected.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Installs a global subscriber reading `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Emits human-readable lines; use [`init_json`] when
/// the host wants machine-parsable logs instead.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// Same as [`init`] but emits newline-delimited JSON, for hosts shipping
/// logs to a structured sink.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}
