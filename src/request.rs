//! Request value object and dispatch info (§3 "Request", "Dispatch info").

use crate::config::InterfaceAddress;
use crate::path_key::PathKey;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use std::net::SocketAddr;
use std::sync::Arc;

/// The endpoint interface a request arrived on, plus the remote peer (§3
/// "request context" referenced from Request).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub interface: InterfaceAddress,
    pub remote_origin: SocketAddr,
    pub connection_id: String,
}

/// An immutable view of an incoming HTTP request (§3 "Request").
#[derive(Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub context: Arc<RequestContext>,
    pub request_id: String,
}

impl Request {
    pub fn path_key(&self) -> PathKey {
        PathKey::from_url_path(self.uri.path())
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_get_or_head(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// The (base, extra) pair threaded through routers: `base` is consumed
/// path, `extra` is the remainder to match (§3 "Dispatch info").
#[derive(Debug, Clone)]
pub struct DispatchInfo {
    pub base: PathKey,
    pub extra: PathKey,
}

impl DispatchInfo {
    pub fn from_request(req: &Request) -> Self {
        Self { base: PathKey::empty(), extra: req.path_key() }
    }

    /// Rebinds (base, extra) after a router consumes `matched_len` leading
    /// components of `extra`.
    pub fn descend(&self, matched_len: usize, remainder: PathKey) -> Self {
        let consumed = self.extra.take(matched_len);
        Self { base: self.base.join(&consumed), extra: remainder }
    }
}
