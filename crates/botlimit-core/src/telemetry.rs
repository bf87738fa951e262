//! Process-wide structured logging setup, shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info` when unset.
pub fn init() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.init();
}
