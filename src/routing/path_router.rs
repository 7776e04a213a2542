//! Path router (§4.3.2): dispatches by the dispatch info's `extra` URL path,
//! most-specific candidate first.

use crate::application::Application;
use crate::component::BoxFuture;
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::managers::ApplicationManager;
use crate::path_key::PathKey;
use crate::request::{DispatchInfo, Request};
use crate::response::Response;
use crate::tree_map::TreeMap;
use std::sync::{Arc, RwLock};

pub struct PathRouter {
    apps: Arc<ApplicationManager>,
    tree: RwLock<TreeMap<String>>,
}

impl PathRouter {
    pub fn new(apps: Arc<ApplicationManager>) -> Self {
        Self { apps, tree: RwLock::new(TreeMap::new()) }
    }

    /// Binds a URL path pattern (e.g. `/api/*`, or an exact path with no
    /// trailing wildcard) to an application name.
    pub fn bind(&self, pattern: &str, application: impl Into<String>) -> Result<(), String> {
        let (path, wildcard) = if let Some(stripped) = pattern.strip_suffix('*') {
            (stripped, true)
        } else {
            (pattern, false)
        };
        let key = PathKey::from_url_path(path);
        let key = PathKey::new(
            key.components().iter().filter(|c| !c.is_empty()).cloned().collect(),
            wildcard,
        );
        self.tree.write().unwrap().add(&key, application.into())
    }
}

impl Application for PathRouter {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
        Box::pin(async move {
            let candidates: Vec<(usize, String, PathKey)> = {
                let tree = self.tree.read().unwrap();
                tree.find_with_fallback(&dispatch.extra)
                    .into_iter()
                    .map(|m| (m.matched_len, m.value.clone(), m.remainder))
                    .collect()
            };

            for (matched_len, name, remainder) in candidates {
                let app = self
                    .apps
                    .get(&name)
                    .map_err(|_| CoreError::Config(ConfigError::UnknownApplication(name.clone())))?;
                let next_dispatch = dispatch.descend(matched_len, remainder);
                if let Some(resp) = app.handle(request, &next_dispatch).await? {
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
    use http::{HeaderMap, Method, StatusCode};

    struct Recorder(u16, std::sync::Mutex<Option<PathKey>>);
    impl Application for Recorder {
        fn handle<'a>(&'a self, _r: &'a Request, d: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
            *self.1.lock().unwrap() = Some(d.extra.clone());
            let code = self.0;
            Box::pin(async move {
                Ok(Some(Response::Status(StatusResponse::new(StatusCode::from_u16(code).unwrap()))))
            })
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
    async fn longest_prefix_wins() {
        let apps = Arc::new(ApplicationManager::new());
        apps.register("appA", Arc::new(Recorder(210, std::sync::Mutex::new(None))));
        apps.register("appB", Arc::new(Recorder(211, std::sync::Mutex::new(None))));

        let router = PathRouter::new(apps.clone());
        router.bind("/api/*", "appA").unwrap();
        router.bind("/api/v1/*", "appB").unwrap();

        let req = request_for("/api/v1/users/3");
        let dispatch = DispatchInfo::from_request(&req);
        let resp = router.handle(&req, &dispatch).await.unwrap().unwrap();
        assert_eq!(resp.status_code(), StatusCode::from_u16(211).unwrap());
    }
}
