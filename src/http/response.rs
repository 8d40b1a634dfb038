//! Response framing.
//!
//! # Responsibilities
//! - Status line and the fixed header block (Date, Server,
//!   Content-Length, Content-Type)
//! - Generated HTML error pages
//! - Re-framing the segments produced by dynamic handlers

use std::path::Path;
use std::time::SystemTime;

/// Status codes produced by the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    PermissionDenied,
    NotFound,
    NotImplemented,
    NotSupported,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::PermissionDenied => 403,
            Status::NotFound => 404,
            Status::NotImplemented | Status::NotSupported => 501,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::PermissionDenied => "Permission Denied",
            Status::NotFound => "Not Found",
            Status::NotImplemented => "Not Implemented",
            Status::NotSupported => "Not Supported",
        }
    }
}

/// Status line plus headers, terminated by the blank line.
pub fn head(status: Status, server: &str, content_length: u64, content_type: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nDate: {}\r\nServer: {}\r\nContent-Length: {}\r\nContent-Type: {}\r\n\r\n",
        status.code(),
        status.message(),
        httpdate::fmt_http_date(SystemTime::now()),
        server,
        content_length,
        content_type,
    )
}

/// Content type guessed from the file extension.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// The minimal HTML document sent with error responses.
pub fn error_page(status: Status) -> String {
    format!(
        "<html><head><title>{message}</title></head><body><h1>HTTP Error {code}: {message}</h1></body></html>",
        code = status.code(),
        message = status.message(),
    )
}

/// A complete error response. The body is left out for HEAD requests.
pub fn error(status: Status, server: &str, with_body: bool) -> Vec<u8> {
    let page = error_page(status);
    let mut response = head(status, server, page.len() as u64, "text/html; charset=utf-8").into_bytes();
    if with_body {
        response.extend_from_slice(page.as_bytes());
    }
    response
}

/// Reassemble handler segments into a response.
///
/// The first segment is the header block. Any further segments form the
/// body, rejoined with the separator they were split on.
pub fn from_segments(segments: &[String], with_body: bool) -> Vec<u8> {
    let Some((head, body)) = segments.split_first() else {
        return Vec::new();
    };

    let mut response = head.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
    response.extend_from_slice(b"\r\n\r\n");
    if with_body && !body.is_empty() {
        response.extend_from_slice(body.join("\r\n\r\n").as_bytes());
    }
    response
}
