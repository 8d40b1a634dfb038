//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept with timeout)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (connection id, boxed stream)
//!     → Hand off to a RequestProcessor via the scheduler
//! ```
//!
//! # Design Decisions
//! - Accept never blocks longer than the accept timeout
//! - TLS is optional and handled transparently
//! - A failed handshake drops that client only

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{BoxedStream, Connection, ConnectionId};
pub use listener::{bind, Listener, ListenerError};
pub use tls::{load_tls_acceptor, TlsError};
