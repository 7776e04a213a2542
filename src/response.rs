//! Response types (§3 "Response"). A response is either a bare status code
//! or a full response with headers and a body source; both are frozen
//! (immutable) once constructed and handed upstream.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::path::PathBuf;

/// Where a full response's body bytes come from.
#[derive(Debug, Clone)]
pub enum BodySource {
    /// An in-memory buffer.
    Buffer(Bytes),
    /// A file on disk, optionally restricted to a byte range (inclusive,
    /// exclusive end), as used by range handling (§4.4).
    File { path: PathBuf, total_len: u64, range: Option<(u64, u64)> },
}

impl BodySource {
    pub fn len(&self) -> u64 {
        match self {
            BodySource::Buffer(b) => b.len() as u64,
            BodySource::File { range: Some((start, end)), .. } => end - start,
            BodySource::File { total_len, .. } => *total_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bare status code response, expanded by the endpoint before being sent
/// (§3, §4.2 step 4).
#[derive(Debug, Clone, Copy)]
pub struct StatusResponse {
    pub status: StatusCode,
}

impl StatusResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

/// Status + headers + body source (§3 "Response").
#[derive(Debug, Clone)]
pub struct FullResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<BodySource>,
}

impl FullResponse {
    pub fn builder(status: StatusCode) -> FullResponseBuilder {
        FullResponseBuilder { status, headers: HeaderMap::new(), body: None }
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(http::header::ETAG).and_then(|v| v.to_str().ok())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get(http::header::LAST_MODIFIED).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.body.as_ref().map(|b| b.len())
    }
}

pub struct FullResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<BodySource>,
}

impl FullResponseBuilder {
    pub fn header(mut self, name: http::header::HeaderName, value: impl Into<Vec<u8>>) -> Self {
        if let Ok(v) = http::HeaderValue::from_bytes(&value.into()) {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn body(mut self, body: BodySource) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Freezes the builder into an immutable [`FullResponse`].
    pub fn build(self) -> FullResponse {
        FullResponse { status: self.status, headers: self.headers, body: self.body }
    }
}

/// Either form a handler may return (§3, §6 request-handler contract). `None`
/// from a handler means "not handled, try the next candidate" and is
/// represented at the call site as `Option<Response>`, not as a variant here.
#[derive(Debug, Clone)]
pub enum Response {
    Status(StatusResponse),
    Full(FullResponse),
}

impl Response {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Response::Status(s) => s.status,
            Response::Full(f) => f.status,
        }
    }
}

/// Body-allowed table (§4.4): `HEAD` allows a body only for error statuses;
/// otherwise disallowed for 1xx/204/205/304, allowed otherwise.
pub fn body_allowed(method: &http::Method, status: StatusCode) -> bool {
    if *method == http::Method::HEAD {
        return status.as_u16() >= 400;
    }
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status.as_u16() == 205
        || status == StatusCode::NOT_MODIFIED)
}

/// Body-required table (§4.4): `HEAD` never requires a body; otherwise
/// 200/206 require one.
pub fn body_required(method: &http::Method, status: StatusCode) -> bool {
    if *method == http::Method::HEAD {
        return false;
    }
    status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_never_requires_body() {
        assert!(!body_required(&http::Method::HEAD, StatusCode::OK));
    }

    #[test]
    fn head_body_allowed_only_on_error() {
        assert!(!body_allowed(&http::Method::HEAD, StatusCode::OK));
        assert!(body_allowed(&http::Method::HEAD, StatusCode::NOT_FOUND));
    }

    #[test]
    fn body_disallowed_for_304() {
        assert!(!body_allowed(&http::Method::GET, StatusCode::NOT_MODIFIED));
        assert!(body_allowed(&http::Method::GET, StatusCode::OK));
    }
}
