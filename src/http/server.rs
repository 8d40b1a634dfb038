//! The accept loop.
//!
//! # Responsibilities
//! - Validate the configuration and set up the shared authorization engine
//! - Optionally wrap accepted sockets in TLS
//! - Hand every connection to the scheduler as a new worker
//! - Reconcile the scheduler on every idle accept tick
//! - On shutdown, join all workers and persist rules and credentials
//!
//! # Design Decisions
//! - One accept loop task; connections never block it beyond a bounded
//!   TLS handshake
//! - A failing handshake or accept drops that attempt only

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use crate::auth::{AuthHandler, RuleError, SharedAuth};
use crate::config::{check_config, ConfigError, ServerConfig};
use crate::http::processor::{RequestProcessor, ServeOptions};
use crate::lifecycle::scheduler::Scheduler;
use crate::net::{self, BoxedStream, Listener, TlsError};

/// Errors that prevent the server from starting or from shutting down
/// cleanly.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot resolve root {path:?}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rules: {0}")]
    Rules(#[from] RuleError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

/// The file server: accept loop, scheduler and shared engine.
pub struct Server {
    config: ServerConfig,
    options: Arc<ServeOptions>,
    auth: SharedAuth,
    tls: Option<TlsAcceptor>,
    scheduler: Scheduler,
}

impl Server {
    /// Validate `config` and prepare everything needed to serve.
    ///
    /// The rule file is loaded, repaired and saved back here.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        check_config(&config)?;

        let root = config
            .server
            .root
            .canonicalize()
            .map_err(|source| ServerError::Root {
                path: config.server.root.clone(),
                source,
            })?;

        let tls = if !config.tls.enabled {
            None
        } else if net::tls::files_present(&config.tls.cert_path, &config.tls.key_path) {
            Some(net::load_tls_acceptor(&config.tls.cert_path, &config.tls.key_path)?)
        } else {
            tracing::warn!(
                cert = %config.tls.cert_path.display(),
                key = %config.tls.key_path.display(),
                "Certificate or key missing, serving plain HTTP"
            );
            None
        };

        let auth = AuthHandler::load(&root, &config.server.rules_file, &config.handlers)?.into_shared();
        let scheduler = Scheduler::new(config.scheduler.max_workers);
        let options = Arc::new(ServeOptions::new(root, &config));

        tracing::info!(
            port = config.server.port,
            root = %options.root.display(),
            tls = tls.is_some(),
            max_workers = scheduler.max_workers(),
            "Server configured"
        );

        Ok(Self {
            config,
            options,
            auth,
            tls,
            scheduler,
        })
    }

    /// The engine shared with the workers.
    pub fn auth(&self) -> SharedAuth {
        Arc::clone(&self.auth)
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Serve connections from `listener` until `shutdown` fires.
    pub async fn run(
        mut self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let listener = Listener::new(listener, self.config.connection.accept_timeout());
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, tls = self.is_tls(), "Accepting connections");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(Some((stream, client))) => self.admit(stream, client).await,
                    Ok(None) => self.scheduler.reconcile(),
                    Err(err) => tracing::error!(error = %err, "Accept failed"),
                }
            }
        }

        self.scheduler.shutdown().await;
        self.auth.lock().await.shutdown()?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Wrap `stream` if needed and queue a worker for it.
    async fn admit(&mut self, stream: TcpStream, client: SocketAddr) {
        let stream: BoxedStream = match &self.tls {
            None => Box::new(stream),
            Some(acceptor) => {
                let handshake = acceptor.accept(stream);
                match tokio::time::timeout(self.config.connection.handshake_timeout(), handshake).await {
                    Ok(Ok(tls_stream)) => Box::new(tls_stream),
                    Ok(Err(err)) => {
                        tracing::warn!(client = %client, error = %err, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(client = %client, "TLS handshake timed out");
                        return;
                    }
                }
            }
        };

        let processor = RequestProcessor::new(stream, client, Arc::clone(&self.options), self.auth());
        tracing::info!(client = %client, id = %processor.id(), "Connection admitted");
        self.scheduler.add(processor);
    }
}
