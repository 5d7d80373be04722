//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` (usually the
/// `[logging] filter` entry of the config file) is used.
///
/// # Example
/// ```no_run
/// vkpresent_core::init_logging("info,vkpresent=debug");
/// tracing::info!("Presentation loop starting");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
