//! Request parsing.
//!
//! # Responsibilities
//! - Find the boundary of one request in buffered bytes
//! - Parse the request line, headers and body
//! - Percent-decode the path and collect query parameters
//! - Resolve the path against the document root without escaping it
//!
//! # Design Decisions
//! - Methods are matched case-insensitively
//! - A request line without a method is skipped, not answered
//! - Path resolution is lexical; `..` can never climb above the root

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use percent_encoding::percent_decode_str;

/// Multi-valued request parameters.
pub type Params = BTreeMap<String, Vec<String>>;

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("get") {
            Ok(Method::Get)
        } else if s.eq_ignore_ascii_case("head") {
            Ok(Method::Head)
        } else if s.eq_ignore_ascii_case("post") {
            Ok(Method::Post)
        } else {
            Err(())
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Percent-decoded path, without the query string.
    pub path: String,
    /// Parameters from the query string.
    pub query: Params,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parameters from a URL-encoded body.
    pub fn form_params(&self) -> Params {
        parse_params(self.body.trim_end_matches(['\r', '\n']))
    }
}

/// Result of parsing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Request(Request),
    /// A method token other than GET, HEAD or POST.
    Unsupported(String),
    /// Nothing usable on the request line.
    Malformed,
}

/// Boundary of the first request in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// More bytes are needed.
    Incomplete,
    /// The first request spans this many bytes.
    Complete(usize),
    /// The declared length cannot be represented.
    Oversized,
}

/// Locate the end of the first request in `buf`, including a body of
/// `Content-Length` bytes.
pub fn frame(buf: &[u8]) -> Frame {
    let Some((head_end, separator)) = find_head_end(buf) else {
        return Frame::Incomplete;
    };

    let head = String::from_utf8_lossy(&buf[..head_end]);
    let content_length = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let Some(total) = (head_end + separator).checked_add(content_length) else {
        return Frame::Oversized;
    };
    if buf.len() >= total {
        Frame::Complete(total)
    } else {
        Frame::Incomplete
    }
}

fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|window| window == b"\r\n\r\n");
    let lf = buf.windows(2).position(|window| window == b"\n\n");
    match (crlf, lf) {
        (Some(crlf), Some(lf)) if lf < crlf => Some((lf, 2)),
        (Some(crlf), _) => Some((crlf, 4)),
        (None, Some(lf)) => Some((lf, 2)),
        (None, None) => None,
    }
}

/// Parse one framed request.
pub fn parse(text: &str) -> Parsed {
    let (head, body) = match find_head_end(text.as_bytes()) {
        Some((index, separator)) => (&text[..index], &text[index + separator..]),
        None => (text, ""),
    };

    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line.split_whitespace();

    let Some(method_token) = tokens.next() else {
        return Parsed::Malformed;
    };
    let Ok(method) = method_token.parse::<Method>() else {
        return Parsed::Unsupported(method_token.to_string());
    };
    let Some(target) = tokens.next() else {
        return Parsed::Malformed;
    };

    let (raw_path, query) = target.split_once('?').unwrap_or((target, ""));
    let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    Parsed::Request(Request {
        method,
        path,
        query: parse_params(query),
        headers,
        body: body.to_string(),
    })
}

/// Parse URL-encoded `key=value` pairs into a multi-valued map.
pub fn parse_params(input: &str) -> Params {
    let mut params = Params::new();
    for (key, value) in form_urlencoded::parse(input.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolve a decoded request path against `root`.
///
/// `/` maps to the index page. Returns `None` if the normalized result is
/// not inside `root`, which must itself be normalized and absolute.
pub fn resolve(root: &Path, index: &str, path: &str) -> Option<PathBuf> {
    let relative = if path == "/" {
        index
    } else {
        path.trim_start_matches('/')
    };
    let resolved = normalize_path(&root.join(relative));
    resolved.starts_with(root).then_some(resolved)
}
