//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the file server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Document root, port and index page.
    pub server: ServerSection,

    /// Optional HTTPS support.
    pub tls: TlsConfig,

    /// Worker admission control.
    pub scheduler: SchedulerConfig,

    /// Per-connection I/O limits.
    pub connection: ConnectionConfig,

    /// Dynamic page handler execution.
    pub handlers: HandlerConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Listener and document settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// Directory served to clients. Must exist.
    pub root: PathBuf,

    /// TCP port. Kept wider than `u16` so out-of-range values from a config
    /// file surface as a validation error instead of a parse error.
    pub port: u32,

    /// Page served for `/`, relative to the root.
    pub index: String,

    /// Value of the `Server` response header.
    pub server_name: String,

    /// Rule file name, relative to the root.
    pub rules_file: String,

    /// Request path whose POST carries login attempts.
    pub login_page: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("website"),
            port: 8080,
            index: "index.html".to_string(),
            server_name: "gatehouse".to_string(),
            rules_file: "rules.json".to_string(),
            login_page: "/login.html".to_string(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Wrap accepted sockets in TLS.
    pub enabled: bool,

    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: PathBuf::from("certificates/signed.crt"),
            key_path: PathBuf::from("certificates/signed.private.key"),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of connection workers running at once.
    pub max_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_workers: 50 }
    }
}

/// Connection worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Timeout of a single socket read before the keep-alive flag is
    /// re-checked, in milliseconds.
    pub read_timeout_ms: u64,

    /// Timeout of a single accept call in the server loop, in milliseconds.
    pub accept_timeout_ms: u64,

    /// Longest wait for a TLS handshake, in milliseconds.
    pub handshake_timeout_ms: u64,

    /// Largest request (head plus body) buffered in memory.
    pub max_request_bytes: usize,
}

impl ConnectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            accept_timeout_ms: 1000,
            handshake_timeout_ms: 5000,
            max_request_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Dynamic handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Upper bound on a handler run in seconds. Zero waits forever.
    pub timeout_secs: u64,

    /// Script extension to interpreter program.
    pub interpreters: BTreeMap<String, String>,
}

impl HandlerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        let mut interpreters = BTreeMap::new();
        interpreters.insert("py".to_string(), "python3".to_string());
        interpreters.insert("sh".to_string(), "sh".to_string());
        Self {
            timeout_secs: 30,
            interpreters,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
