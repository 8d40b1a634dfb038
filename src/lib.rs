//! Gatehouse: a small HTTP/HTTPS file server with rule-based access control.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use auth::{AuthHandler, SharedAuth};
pub use config::schema::ServerConfig;
pub use http::{Server, ServerError};
pub use lifecycle::Shutdown;
