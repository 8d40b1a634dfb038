//! The connection worker.
//!
//! One `RequestProcessor` owns one accepted client stream and serves its
//! requests strictly one after another:
//!
//! ```text
//! READING → PARSED → SERVING_STATIC | DELEGATING → READING ... → STOPPED
//! ```
//!
//! Reads are bounded by a short timeout so the keep-alive flag is re-checked
//! regularly. Socket errors and undecodable requests end the connection;
//! everything else is answered with a well-formed response.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::Instrument;

use crate::auth::SharedAuth;
use crate::config::ServerConfig;
use crate::http::request::{self, Frame, Method, Parsed, Request};
use crate::http::response::{self, Status};
use crate::lifecycle::scheduler::{KeepAlive, Worker, WorkerFuture};
use crate::net::{BoxedStream, ConnectionId};

/// Size of a single socket read and of a single file chunk written back.
pub const CHUNK_SIZE: usize = 2048;

/// Errors that end a connection.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("socket read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("request is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),

    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Settings shared by every worker of a server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Normalized absolute document root.
    pub root: PathBuf,
    pub index: String,
    pub server_name: String,
    pub login_page: String,
    pub read_timeout: Duration,
    pub max_request_bytes: usize,
}

impl ServeOptions {
    pub fn new(root: PathBuf, config: &ServerConfig) -> Self {
        Self {
            root,
            index: config.server.index.clone(),
            server_name: config.server.server_name.clone(),
            login_page: config.server.login_page.clone(),
            read_timeout: config.connection.read_timeout(),
            max_request_bytes: config.connection.max_request_bytes,
        }
    }
}

/// Serves all requests of one client connection.
pub struct RequestProcessor {
    id: ConnectionId,
    stream: Option<BoxedStream>,
    client: SocketAddr,
    options: Arc<ServeOptions>,
    auth: SharedAuth,
    keep_alive: KeepAlive,
}

impl RequestProcessor {
    pub fn new(
        stream: BoxedStream,
        client: SocketAddr,
        options: Arc<ServeOptions>,
        auth: SharedAuth,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            stream: Some(stream),
            client,
            options,
            auth,
            keep_alive: KeepAlive::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Read and answer requests until stopped or the client goes away.
    pub async fn serve(mut self) {
        tracing::debug!("Worker started");
        let mut pending = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];

        while self.keep_alive.is_alive() {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            match tokio::time::timeout(self.options.read_timeout, stream.read(&mut chunk)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    tracing::debug!("Client closed the connection");
                    break;
                }
                Ok(Ok(n)) => pending.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) => {
                    tracing::error!(error = %ProcessorError::Read(err), "Closing connection");
                    break;
                }
            }

            if let Err(err) = self.drain(&mut pending).await {
                tracing::error!(error = %err, "Closing connection");
                break;
            }
        }

        self.stop().await;
    }

    /// Clear the keep-alive flag and release the socket.
    pub async fn stop(&mut self) {
        self.keep_alive.stop();
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            tracing::info!("Connection closed");
        }
    }

    /// Handle every complete request in `pending`.
    async fn drain(&mut self, pending: &mut Vec<u8>) -> Result<(), ProcessorError> {
        loop {
            match request::frame(pending) {
                Frame::Incomplete => {
                    if pending.len() > self.options.max_request_bytes {
                        return Err(ProcessorError::TooLarge {
                            limit: self.options.max_request_bytes,
                        });
                    }
                    return Ok(());
                }
                Frame::Oversized => {
                    return Err(ProcessorError::TooLarge {
                        limit: self.options.max_request_bytes,
                    });
                }
                Frame::Complete(len) => {
                    let raw: Vec<u8> = pending.drain(..len).collect();
                    let text = String::from_utf8(raw)?;
                    self.handle(&text).await;
                }
            }
        }
    }

    async fn handle(&mut self, text: &str) {
        match request::parse(text) {
            Parsed::Malformed => {
                tracing::warn!("Skipping malformed request");
            }
            Parsed::Unsupported(method) => {
                tracing::warn!(method = %method, "Method not implemented");
                self.send_error(Status::NotImplemented, true).await;
            }
            Parsed::Request(request) => match request.method {
                Method::Get | Method::Head => self.handle_get(request).await,
                Method::Post => self.handle_post(request).await,
            },
        }
    }

    async fn handle_get(&mut self, request: Request) {
        let head_only = request.method == Method::Head;
        tracing::debug!(
            method = ?request.method,
            path = %request.path,
            host = request.header("host").unwrap_or("-"),
            "Request"
        );

        let Some(path) = request::resolve(&self.options.root, &self.options.index, &request.path) else {
            tracing::warn!(path = %request.path, "Path escapes the document root");
            self.send_error(Status::PermissionDenied, !head_only).await;
            return;
        };
        let is_index = request.path == "/";

        let auth = Arc::clone(&self.auth);
        let segments = {
            let engine = auth.lock().await;
            if !is_index && !engine.auth(&path, self.client.ip()) {
                None
            } else {
                Some(engine.handle(&path, &request.query).await)
            }
        };

        match segments {
            None => {
                tracing::warn!(path = %path.display(), "Permission denied");
                self.send_error(Status::PermissionDenied, !head_only).await;
            }
            Some(segments) if !segments.is_empty() => {
                tracing::info!(path = %path.display(), segments = segments.len(), "Served dynamic content");
                self.send(&response::from_segments(&segments, !head_only)).await;
            }
            Some(_) => self.serve_static(&path, head_only).await,
        }
    }

    async fn handle_post(&mut self, request: Request) {
        let params = request.form_params();
        tracing::debug!(path = %request.path, params = params.len(), "POST request");

        let Some(path) = request::resolve(&self.options.root, &self.options.index, &request.path) else {
            tracing::warn!(path = %request.path, "Path escapes the document root");
            self.send_error(Status::PermissionDenied, true).await;
            return;
        };

        let auth = Arc::clone(&self.auth);
        let segments = {
            let mut engine = auth.lock().await;
            let segments = engine.handle(&path, &params).await;

            let login = request.path == self.options.login_page;
            let username = params.get("username").and_then(|values| values.first());
            if let (true, Some(username)) = (login, username) {
                match segments.len() {
                    0 => {}
                    1 => {
                        tracing::info!(user = %username, "Login accepted");
                        engine.update_user_session(self.client.ip(), Some(username.clone()));
                    }
                    _ => {
                        tracing::warn!(user = %username, "Login rejected");
                        engine.update_user_session(self.client.ip(), None);
                    }
                }
            }
            segments
        };

        if segments.is_empty() {
            self.send_error(Status::NotSupported, true).await;
        } else {
            self.send(&response::from_segments(&segments, true)).await;
        }
    }

    async fn serve_static(&mut self, path: &Path, head_only: bool) {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                tracing::warn!(path = %path.display(), "File not found");
                self.send_error(Status::NotFound, !head_only).await;
                return;
            }
        };

        let head = response::head(
            Status::Ok,
            &self.options.server_name,
            metadata.len(),
            &response::content_type(path),
        );

        if head_only {
            self.send(head.as_bytes()).await;
            return;
        }

        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to open file");
                self.send_error(Status::NotFound, true).await;
                return;
            }
        };

        if !self.send(head.as_bytes()).await {
            return;
        }

        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match file.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if !self.send(&chunk[..n]).await {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Failed to read file");
                    return;
                }
            }
        }

        tracing::info!(path = %path.display(), bytes = metadata.len(), "Served file");
    }

    async fn send_error(&mut self, status: Status, with_body: bool) {
        let bytes = response::error(status, &self.options.server_name, with_body);
        self.send(&bytes).await;
    }

    /// Write `bytes` completely. A failure is logged and reported as `false`.
    async fn send(&mut self, bytes: &[u8]) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        let result = match stream.write_all(bytes).await {
            Ok(()) => stream.flush().await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to send response");
                false
            }
        }
    }
}

impl Worker for RequestProcessor {
    fn keep_alive(&self) -> KeepAlive {
        self.keep_alive.clone()
    }

    fn run(self: Box<Self>) -> WorkerFuture {
        let span = tracing::info_span!("connection", id = %self.id, client = %self.client);
        Box::pin((*self).serve().instrument(span))
    }
}
