//! Host router (§4.3.1): dispatches by the request's `host` header, using a
//! reversed-hostname tree-map and find-with-fallback.

use crate::application::Application;
use crate::component::BoxFuture;
use crate::error::CoreResult;
use crate::managers::ApplicationManager;
use crate::path_key::PathKey;
use crate::request::{DispatchInfo, Request};
use crate::response::Response;
use crate::tree_map::TreeMap;
use std::sync::{Arc, RwLock};

pub struct HostRouter {
    apps: Arc<ApplicationManager>,
    tree: RwLock<TreeMap<String>>,
}

impl HostRouter {
    pub fn new(apps: Arc<ApplicationManager>) -> Self {
        Self { apps, tree: RwLock::new(TreeMap::new()) }
    }

    /// Binds a hostname pattern (may be `*` or `*.example.com`) to an
    /// application name.
    pub fn bind(&self, hostname: &str, application: impl Into<String>) -> Result<(), String> {
        let key = PathKey::from_hostname(hostname);
        self.tree.write().unwrap().add(&key, application.into())
    }
}

impl Application for HostRouter {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
        Box::pin(async move {
            let Some(host) = request.header_str(http::header::HOST.as_str()) else {
                return Ok(None);
            };
            // Strip a port suffix, if present, before parsing the host path.
            let host = host.split(':').next().unwrap_or(host);
            let key = PathKey::from_hostname(host);

            let candidates: Vec<String> = {
                let tree = self.tree.read().unwrap();
                tree.find_with_fallback(&key).into_iter().map(|m| m.value.clone()).collect()
            };

            for name in candidates {
                let app = self.apps.get(&name)?;
                if let Some(resp) = app.handle(request, dispatch).await? {
                    return Ok(Some(resp));
                }
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceAddress;
    use crate::request::RequestContext;
    use crate::response::StatusResponse;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};

    struct Fixed(u16);
    impl Application for Fixed {
        fn handle<'a>(&'a self, _r: &'a Request, _d: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
            let code = self.0;
            Box::pin(async move {
                Ok(Some(Response::Status(StatusResponse::new(StatusCode::from_u16(code).unwrap()))))
            })
        }
    }

    fn request_with_host(host: &str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, HeaderValue::from_str(host).unwrap());
        Request {
            method: Method::GET,
            uri: "/".parse().unwrap(),
            headers,
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
    async fn host_fallthrough() {
        let apps = Arc::new(ApplicationManager::new());
        apps.register("appX", Arc::new(Fixed(201)));
        apps.register("appY", Arc::new(Fixed(202)));

        let router = HostRouter::new(apps);
        router.bind("*.example.com", "appX").unwrap();
        router.bind("a.example.com", "appY").unwrap();

        let dispatch = DispatchInfo::from_request(&request_with_host("a.example.com"));

        let resp = router.handle(&request_with_host("a.example.com"), &dispatch).await.unwrap();
        assert_eq!(resp.unwrap().status_code(), StatusCode::from_u16(202).unwrap());

        let resp = router.handle(&request_with_host("b.example.com"), &dispatch).await.unwrap();
        assert_eq!(resp.unwrap().status_code(), StatusCode::from_u16(201).unwrap());

        let resp = router.handle(&request_with_host("other.net"), &dispatch).await.unwrap();
        assert!(resp.is_none());
    }
}
