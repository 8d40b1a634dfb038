//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: path, client, user, error)
//!     → connection spans (id, client address) from the workers
//!
//! Consumers:
//!     → logging.rs (fmt layer on stdout, filtered by level)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level when set
//! - Every connection worker runs inside its own span

pub mod logging;

pub use logging::init;
