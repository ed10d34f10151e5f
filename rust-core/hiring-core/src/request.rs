//! # HTTP Request
//!
//! Transport-neutral request passed through middleware and handlers.
//!
//! Method, decoded path and headers are taken from hyper once; the remote
//! address and authenticated identity travel with the request as context.

use crate::error::{Error, Result};
use crate::middleware::Identity;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// HTTP request method; unknown tokens are kept as sent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
    /// HTTP TRACE
    Trace,
    /// HTTP CONNECT
    Connect,
    /// Extension method (e.g. `PURGE`)
    Other(String),
}

impl From<&hyper::Method> for Method {
    fn from(method: &hyper::Method) -> Self {
        match *method {
            hyper::Method::GET => Self::Get,
            hyper::Method::POST => Self::Post,
            hyper::Method::PUT => Self::Put,
            hyper::Method::DELETE => Self::Delete,
            hyper::Method::PATCH => Self::Patch,
            hyper::Method::HEAD => Self::Head,
            hyper::Method::OPTIONS => Self::Options,
            hyper::Method::TRACE => Self::Trace,
            hyper::Method::CONNECT => Self::Connect,
            _ => Self::Other(method.as_str().to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
            Self::Trace => write!(f, "TRACE"),
            Self::Connect => write!(f, "CONNECT"),
            Self::Other(token) => f.write_str(token),
        }
    }
}

/// Incoming HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Percent-decoded request path (without query string)
    pub path: String,
    /// Peer address, when the request came over the network
    pub remote_addr: Option<SocketAddr>,
    /// Identity attached by the authenticate middleware
    pub identity: Option<Identity>,
    headers: hyper::HeaderMap,
}

impl Request {
    /// Create a request manually (for testing/internal use)
    ///
    /// A `?query` suffix on `path` is dropped and the rest is percent-decoded.
    pub fn new(method: Method, path: impl AsRef<str>, headers_map: HashMap<String, String>) -> Self {
        let raw = path.as_ref();
        let raw = raw.split_once('?').map_or(raw, |(p, _)| p);

        let mut headers = hyper::HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self {
            method,
            path: decode_path(raw),
            remote_addr: None,
            identity: None,
            headers,
        }
    }

    /// Create from a hyper request, rejecting bodies above `max_body_size`
    ///
    /// The body is read to enforce the limit and then discarded.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the body exceeds the limit, or
    /// `Error::Http` if the body cannot be read.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from(req.method());
        let path = decode_path(req.uri().path());
        let headers = req.headers().clone();

        if let Some(content_len) = headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok())
        {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let received = BodyExt::collect(req.into_body()).await?.to_bytes().len();
        if received > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: received,
            });
        }

        Ok(Self {
            method,
            path,
            remote_addr: None,
            identity: None,
            headers,
        })
    }

    /// Attach the peer address
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Token from an `Authorization: Bearer <token>` header
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Percent-decode a path; malformed escapes and non-UTF-8 results keep the
/// raw text
fn decode_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| raw.get(i + 1..i + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}
