//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept, optional TLS handshake, admit to scheduler)
//!     → processor.rs (read, frame, dispatch per method)
//!     → request.rs (parse, decode, resolve under the root)
//!     → [auth engine: rules, sessions, handlers]
//!     → response.rs (status line, headers, error pages)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 subset parsed by hand: GET, HEAD and POST
//! - Requests on one connection are answered strictly in order
//! - Paths that leave the root are refused before any rule is consulted

pub mod processor;
pub mod request;
pub mod response;
pub mod server;

pub use processor::{ProcessorError, RequestProcessor, ServeOptions};
pub use request::{Method, Params, Request};
pub use response::Status;
pub use server::{Server, ServerError};
