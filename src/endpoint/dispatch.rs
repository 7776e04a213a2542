//! Request dispatch (§4.2 "Dispatch of a request"): resolves the bound
//! application, synthesizes `404`/`500` as needed, and runs response
//! adjustment. Kept independent of the socket/transport layer so it can be
//! exercised without a live connection.

use crate::adjust::adjust;
use crate::application::Application;
use crate::error::CoreError;
use crate::managers::ApplicationManager;
use crate::request::{DispatchInfo, Request};
use crate::response::{body_allowed, BodySource, FullResponse, Response, StatusResponse};
use crate::service::{AccessLog, AccessLogRecord};
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use std::time::Instant;

/// Expands a bare [`StatusResponse`] into a [`FullResponse`], per §4.2 step 4
/// ("for 404, include the URL in the body").
fn expand_status(status: StatusResponse, request: &Request) -> FullResponse {
    let body = if status.status == StatusCode::NOT_FOUND {
        Some(BodySource::Buffer(Bytes::from(format!("Not found: {}", request.uri.path()))))
    } else if body_allowed(&request.method, status.status) {
        Some(BodySource::Buffer(Bytes::new()))
    } else {
        None
    };
    FullResponse { status: status.status, headers: http::HeaderMap::new(), body }
}

/// Runs §4.2 steps 2-5 for one request against the endpoint's bound
/// application, producing a frozen, adjusted [`FullResponse`].
pub async fn dispatch_request(
    applications: &ApplicationManager,
    application_name: &str,
    request: &Request,
) -> FullResponse {
    let dispatch = DispatchInfo::from_request(request);

    let outcome = match applications.get(application_name) {
        Ok(app) => app.handle(request, &dispatch).await,
        Err(e) => Err(e),
    };

    let response = match outcome {
        Ok(Some(resp)) => resp,
        Ok(None) => Response::Status(StatusResponse::new(StatusCode::NOT_FOUND)),
        Err(CoreError::Config(e)) => {
            log::error!("dispatch config error: {e}");
            Response::Status(StatusResponse::new(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(e) => {
            log::error!("handler failed: {e}");
            Response::Status(StatusResponse::new(StatusCode::INTERNAL_SERVER_ERROR))
        }
    };

    let full = match response {
        Response::Full(f) => f,
        Response::Status(s) => expand_status(s, request),
    };

    let cache_control = request.header_str(http::header::CACHE_CONTROL.as_str());
    let if_none_match = request.header_str(http::header::IF_NONE_MATCH.as_str());
    let if_modified_since = request.header_str(http::header::IF_MODIFIED_SINCE.as_str());
    let range = request.header_str(http::header::RANGE.as_str());

    let adjusted = match adjust(&request.method, Response::Full(full), cache_control, if_none_match, if_modified_since, range) {
        Response::Full(f) => f,
        Response::Status(s) => expand_status(s, request),
    };

    // Head-body rule (§8): a HEAD response never carries body bytes on the
    // wire, whatever the handler produced.
    if request.method == http::Method::HEAD {
        FullResponse { body: None, ..adjusted }
    } else {
        adjusted
    }
}

/// Runs dispatch end to end and, if `access_log` is bound, posts a
/// completion record exactly once (§4.2 step 6, §6 "Access-log contract").
pub async fn dispatch_and_log(
    applications: &ApplicationManager,
    application_name: &str,
    request: &Request,
    access_log: Option<Arc<dyn AccessLog>>,
) -> FullResponse {
    let start = Instant::now();
    let response = dispatch_request(applications, application_name, request).await;

    if let Some(access_log) = access_log {
        let record = AccessLogRecord {
            request_id: request.request_id.clone(),
            connection_id: request.context.connection_id.clone(),
            method: request.method.clone(),
            path: request.uri.path().to_string(),
            status: response.status.as_u16(),
            bytes_sent: response.content_length().unwrap_or(0),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        access_log.log_completed(record).await;
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::BoxFuture;
    use crate::config::InterfaceAddress;
    use crate::error::CoreResult;
    use crate::request::RequestContext;
    use http::{HeaderMap, Method};

    struct AlwaysNull;
    impl Application for AlwaysNull {
        fn handle<'a>(&'a self, _r: &'a Request, _d: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn request_for(path: &str) -> Request {
        Request {
            method: Method::GET,
            uri: path.parse().unwrap(),
            headers: HeaderMap::new(),
            body: bytes::Bytes::new(),
            context: Arc::new(RequestContext {
                interface: InterfaceAddress::for_address("*", 8080),
                remote_origin: "127.0.0.1:1".parse().unwrap(),
                connection_id: "c1".into(),
            }),
            request_id: "r1".into(),
        }
    }

    #[tokio::test]
    async fn unhandled_request_synthesizes_404_with_url() {
        let apps = ApplicationManager::new();
        apps.register("root", Arc::new(AlwaysNull));
        let req = request_for("/missing");
        let resp = dispatch_request(&apps, "root", &req).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        let body = match &resp.body {
            Some(BodySource::Buffer(b)) => String::from_utf8_lossy(b).to_string(),
            _ => String::new(),
        };
        assert!(body.contains("/missing"));
    }

    #[tokio::test]
    async fn unknown_application_is_500() {
        let apps = ApplicationManager::new();
        let req = request_for("/x");
        let resp = dispatch_request(&apps, "missing-app", &req).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct AlwaysFull;
    impl Application for AlwaysFull {
        fn handle<'a>(&'a self, _r: &'a Request, _d: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
            Box::pin(async {
                Ok(Some(Response::Full(
                    FullResponse::builder(StatusCode::OK).body(BodySource::Buffer(bytes::Bytes::from("hello"))).build(),
                )))
            })
        }
    }

    #[tokio::test]
    async fn head_response_never_carries_body_bytes() {
        let apps = ApplicationManager::new();
        apps.register("root", Arc::new(AlwaysFull));
        let mut req = request_for("/x");
        req.method = Method::HEAD;
        let resp = dispatch_request(&apps, "root", &req).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.is_none());
    }
}
