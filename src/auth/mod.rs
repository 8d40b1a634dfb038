//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! <root>/rules.json
//!     → rules.rs (load, repair defaults, glob matching)
//!     → credentials.rs (username/password table from the Database file)
//!     → engine.rs (AuthHandler behind one shared lock)
//!
//! Per request, under the lock:
//!     auth(path, client)      → exceptions → allow → forbidden → default allow
//!     handle(path, params)    → handler.rs (external script, CGI-like)
//!     update_user_session()   → sessions keyed by client address
//! ```
//!
//! # Design Decisions
//! - One coarse lock over rules and sessions; a login's session update and
//!   the next request's exception check are never interleaved
//! - Rule file problems are repaired and persisted, never fatal
//! - Credentials are plaintext, alternating username and password lines

pub mod credentials;
pub mod engine;
pub mod handler;
pub mod rules;

pub use credentials::Credentials;
pub use engine::{AuthHandler, SharedAuth};
pub use handler::{HandlerError, HandlerRunner};
pub use rules::{ExceptionRule, RuleError, RuleSet};
