//! Gatehouse file server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server ──▶ lifecycle::scheduler
//!                 (accept tick)     (TLS, admit)      (≤ max_workers running)
//!                                                          │
//!                                                          ▼
//!     Client ◀── http::response ◀── http::processor ◀── worker task
//!                                      │    ▲
//!                                      ▼    │
//!                                  auth::engine (one lock)
//!                                  rules · sessions · handlers
//! ```

use std::path::PathBuf;

use clap::Parser;

use gatehouse::config::{load_config, ServerConfig};
use gatehouse::lifecycle::{wait_for_signal, Shutdown};
use gatehouse::{net, observability, Server};

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Serve a directory over HTTP or HTTPS with access rules", long_about = None)]
struct Cli {
    /// Document root to serve
    root: PathBuf,

    /// Port to listen on
    port: u32,

    /// Index page under the root, served for "/"
    #[arg(long)]
    index: Option<String>,

    /// Enable HTTPS (requires the certificate and key files)
    #[arg(long)]
    ssl: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of connections served at once
    #[arg(long)]
    max_workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };

        config.server.root = self.root;
        config.server.port = self.port;
        if let Some(index) = self.index {
            config.server.index = index;
        }
        if self.ssl {
            config.tls.enabled = true;
        }
        if let Some(max_workers) = self.max_workers {
            config.scheduler.max_workers = max_workers;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;
    observability::init(&config.logging.level)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatehouse starting");

    let port = config.server.port;
    let server = Server::new(config)?;
    let listener = net::bind(u16::try_from(port)?).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
