//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber once at startup
//! - Map the configured level onto this crate's events
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Human-readable fmt output with span context
//! - Log level configurable via config, CLI and environment

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("gatehouse={}", level)
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
}
