//! Tracing setup shared by the workspace binaries.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// Respects `RUST_LOG` when set; defaults to `info` otherwise.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
