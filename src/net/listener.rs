//! TCP listener with a bounded accept wait.
//!
//! # Responsibilities
//! - Bind to the configured port
//! - Accept incoming TCP connections
//! - Return control to the server loop on every accept timeout, so it can
//!   reconcile workers and observe shutdown

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind a listener on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(ListenerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// A TCP listener whose accept gives up after a timeout.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Longest wait for a single accept.
    accept_timeout: Duration,
}

impl Listener {
    pub fn new(inner: TcpListener, accept_timeout: Duration) -> Self {
        Self {
            inner,
            accept_timeout,
        }
    }

    /// Accept a new connection.
    ///
    /// Returns `Ok(None)` when no client arrived within the accept timeout.
    pub async fn accept(&self) -> Result<Option<(TcpStream, SocketAddr)>, ListenerError> {
        match tokio::time::timeout(self.accept_timeout, self.inner.accept()).await {
            Err(_) => Ok(None),
            Ok(Ok((stream, addr))) => {
                tracing::debug!(peer_addr = %addr, "Connection accepted");
                Ok(Some((stream, addr)))
            }
            Ok(Err(err)) => Err(ListenerError::Accept(err)),
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}
