//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler (scheduler.rs):
//!     Accepted connection → queue → start while under max_workers → reap
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop and join workers → Save rules
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Workers are tokio tasks observed through a shared keep-alive flag
//! - Shutdown waits for every running worker; there is no forced exit

pub mod scheduler;
pub mod shutdown;
pub mod signals;

pub use scheduler::{KeepAlive, Scheduler, Worker, WorkerFuture};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
