//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → owned by the Server; ServeOptions shared via Arc with workers
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Access rules are not part of this config; they live in the rule
//!   file under the document root (see `auth::rules`)

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{check_config, load_config, ConfigError};
pub use schema::{
    ConnectionConfig, HandlerConfig, LoggingConfig, SchedulerConfig, ServerConfig, ServerSection,
    TlsConfig,
};
pub use validation::{validate_config, ValidationError};
