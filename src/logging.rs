//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports common tracing macros to reduce verbosity and maintain
//! consistency across the codebase.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("publishing message");
//! warn!("message file missing, likely raced with another consumer");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO level and above by default. Control with `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug ddmq consume myqueue
/// RUST_LOG=ddmq::broker=trace ddmq publish myqueue "hello"
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
