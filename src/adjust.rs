//! Response adjustment (§4.4): conditional-request (304) and range (206/416)
//! transforms applied to a response before it is sent.

use crate::response::{body_allowed, BodySource, FullResponse, Response};
use http::{Method, StatusCode};

/// Parses an HTTP-date (RFC 7231 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37
/// GMT`) to a second-precision Unix timestamp.
fn parse_http_date(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(s).ok().map(|dt| dt.timestamp())
}

fn etag_matches(list: &str, etag: &str) -> bool {
    if list.trim() == "*" {
        return true;
    }
    list.split(',').any(|candidate| {
        let candidate = candidate.trim().trim_start_matches("W/").trim_matches('"');
        candidate == etag.trim_start_matches("W/").trim_matches('"')
    })
}

/// Applies conditional-request handling (§4.4) to a full response, given the
/// originating request's method and relevant headers.
pub fn adjust_conditional(
    method: &Method,
    response: FullResponse,
    cache_control: Option<&str>,
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
) -> FullResponse {
    if !(*method == Method::GET || *method == Method::HEAD) {
        return response;
    }
    if !body_allowed(method, response.status) {
        return response;
    }
    let has_no_cache = cache_control
        .map(|v| v.split(',').any(|directive| directive.trim().eq_ignore_ascii_case("no-cache")))
        .unwrap_or(false);
    if has_no_cache {
        return response;
    }

    let not_modified = if let Some(inm) = if_none_match {
        response.etag().map(|tag| etag_matches(inm, tag)).unwrap_or(false)
    } else if let Some(ims) = if_modified_since {
        match (response.last_modified().and_then(parse_http_date), parse_http_date(ims)) {
            (Some(resp_ts), Some(req_ts)) => resp_ts <= req_ts,
            _ => false,
        }
    } else {
        false
    };

    if not_modified {
        let mut headers = response.headers.clone();
        headers.remove(http::header::CONTENT_LENGTH);
        FullResponse { status: StatusCode::NOT_MODIFIED, headers, body: None }
    } else {
        response
    }
}

/// Parses a single `bytes=start-end` range (the only form §4.4 requires
/// satisfying literally); returns `None` if syntactically invalid.
fn parse_range(header: &str, total_len: u64) -> Option<Option<(u64, u64)>> {
    let spec = header.strip_prefix("bytes=")?;
    // Only handle a single range; multiple comma-separated ranges are
    // treated as unsupported and fall through to "no adjustment".
    if spec.contains(',') {
        return None;
    }
    let (start_s, end_s) = spec.split_once('-')?;
    if start_s.is_empty() {
        // Suffix range: last N bytes.
        let n: u64 = end_s.parse().ok()?;
        if n == 0 {
            return Some(None); // unsatisfiable
        }
        let start = total_len.saturating_sub(n);
        return Some(Some((start, total_len)));
    }
    let start: u64 = start_s.parse().ok()?;
    let end = if end_s.is_empty() {
        total_len
    } else {
        end_s.parse::<u64>().ok()? + 1
    };
    if start >= total_len || start >= end {
        return Some(None); // unsatisfiable
    }
    Some(Some((start, end.min(total_len))))
}

/// Applies range handling (§4.4) to a `200` full response with a known
/// length, given the request's method and `range:` header (if any).
pub fn adjust_range(method: &Method, response: FullResponse, range_header: Option<&str>) -> FullResponse {
    if !(*method == Method::GET || *method == Method::HEAD) || response.status != StatusCode::OK {
        return response;
    }
    let Some(body) = &response.body else { return response };
    let total_len = body.len();
    let Some(range_header) = range_header else { return response };

    match parse_range(range_header, total_len) {
        None => response, // syntactically invalid: no adjustment
        Some(None) => {
            let mut headers = response.headers.clone();
            headers.insert(
                http::header::CONTENT_RANGE,
                http::HeaderValue::from_str(&format!("bytes */{total_len}")).unwrap(),
            );
            FullResponse { status: StatusCode::RANGE_NOT_SATISFIABLE, headers, body: None }
        }
        Some(Some((start, end))) => {
            let mut headers = response.headers.clone();
            headers.insert(
                http::header::CONTENT_RANGE,
                http::HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end - 1, total_len)).unwrap(),
            );
            let new_body = match body {
                BodySource::Buffer(b) => BodySource::Buffer(b.slice(start as usize..end as usize)),
                BodySource::File { path, total_len, .. } => BodySource::File {
                    path: path.clone(),
                    total_len: *total_len,
                    range: Some((start, end)),
                },
            };
            FullResponse { status: StatusCode::PARTIAL_CONTENT, headers, body: Some(new_body) }
        }
    }
}

/// Full adjustment pipeline applied by the endpoint before sending (§4.2
/// step 5): conditional first, then range (a `304` short-circuits range
/// handling since its status is no longer `200`).
pub fn adjust(
    method: &Method,
    response: Response,
    cache_control: Option<&str>,
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    range_header: Option<&str>,
) -> Response {
    match response {
        Response::Status(s) => Response::Status(s),
        Response::Full(full) => {
            let full = adjust_conditional(method, full, cache_control, if_none_match, if_modified_since);
            let full = adjust_range(method, full, range_header);
            Response::Full(full)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn ok_response(etag: &str, body: &str) -> FullResponse {
        FullResponse::builder(StatusCode::OK)
            .header(http::header::ETAG, etag.as_bytes().to_vec())
            .body(BodySource::Buffer(Bytes::from(body.to_string())))
            .build()
    }

    #[test]
    fn conditional_304_on_matching_etag() {
        let resp = ok_response("\"X\"", "hello");
        let adjusted = adjust_conditional(&Method::GET, resp, None, Some("\"X\""), None);
        assert_eq!(adjusted.status, StatusCode::NOT_MODIFIED);
        assert!(adjusted.body.is_none());
    }

    #[test]
    fn conditional_idempotent() {
        let resp = ok_response("\"X\"", "hello");
        let once = adjust_conditional(&Method::GET, resp, None, Some("\"X\""), None);
        let twice = adjust_conditional(&Method::GET, once.clone(), None, Some("\"X\""), None);
        assert_eq!(once.status, twice.status);
        assert!(twice.body.is_none());
    }

    #[test]
    fn no_cache_skips_conditional() {
        let resp = ok_response("\"X\"", "hello");
        let adjusted = adjust_conditional(&Method::GET, resp, Some("no-cache"), Some("\"X\""), None);
        assert_eq!(adjusted.status, StatusCode::OK);
    }

    #[test]
    fn range_produces_206() {
        let resp = ok_response("\"X\"", "0123456789");
        let adjusted = adjust_range(&Method::GET, resp, Some("bytes=2-5"));
        assert_eq!(adjusted.status, StatusCode::PARTIAL_CONTENT);
        match adjusted.body {
            Some(BodySource::Buffer(b)) => assert_eq!(&b[..], b"2345"),
            _ => panic!("expected buffer body"),
        }
    }

    #[test]
    fn unsatisfiable_range_is_416() {
        let resp = ok_response("\"X\"", "0123456789");
        let adjusted = adjust_range(&Method::GET, resp, Some("bytes=100-200"));
        assert_eq!(adjusted.status, StatusCode::RANGE_NOT_SATISFIABLE);
    }
}
