//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the document root and index page exist
//! - Validate value ranges (port, worker ceiling, I/O timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before the server is constructed

use std::path::PathBuf;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("root directory {0:?} not found")]
    MissingRoot(PathBuf),

    #[error("root {0:?} is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("port {0} should be in [0,65535]")]
    PortOutOfRange(u32),

    #[error("index file {index:?} is not found under {root:?}")]
    MissingIndex { index: String, root: PathBuf },

    #[error("scheduler.max_workers must be at least 1")]
    NoWorkers,

    #[error("connection.{0} must be at least 1")]
    ZeroTimeout(&'static str),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let root = &config.server.root;

    if !root.exists() {
        errors.push(ValidationError::MissingRoot(root.clone()));
    } else if !root.is_dir() {
        errors.push(ValidationError::RootNotDirectory(root.clone()));
    } else if !root.join(&config.server.index).is_file() {
        errors.push(ValidationError::MissingIndex {
            index: config.server.index.clone(),
            root: root.clone(),
        });
    }

    if config.server.port > u32::from(u16::MAX) {
        errors.push(ValidationError::PortOutOfRange(config.server.port));
    }

    if config.scheduler.max_workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    let connection = &config.connection;
    for (field, value) in [
        ("read_timeout_ms", connection.read_timeout_ms),
        ("accept_timeout_ms", connection.accept_timeout_ms),
        ("handshake_timeout_ms", connection.handshake_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
