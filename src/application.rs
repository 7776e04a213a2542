//! Request-handler contract (§6) and the request filter wrapper (§4.3.5).

use crate::component::BoxFuture;
use crate::error::{ConfigError, CoreResult};
use crate::request::{DispatchInfo, Request};
use crate::response::Response;
use http::{Method, StatusCode};
use std::collections::HashSet;

/// Implemented by every leaf/composite application (§6 "Request-handler
/// contract"). Returns `Ok(None)` for "not handled, try the next candidate",
/// `Ok(Some(_))` for a response, `Err(_)` for a failure (converted to `500`
/// by the endpoint, §7.3).
pub trait Application: Send + Sync {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>>;
}

/// Configuration for the optional filter every application may carry
/// (§4.3.5).
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub accept_methods: Option<HashSet<Method>>,
    pub max_path_depth: Option<usize>,
    pub max_path_length: Option<usize>,
    pub max_query_length: Option<usize>,
    pub redirect_directories: bool,
    pub redirect_files: bool,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redirect_directories && self.redirect_files {
            return Err(ConfigError::FilterRedirectConflict);
        }
        Ok(())
    }
}

fn path_length(dispatch: &DispatchInfo) -> usize {
    dispatch.extra.to_url_path().len()
}

/// Joins a base prefix with a path that both already carry a leading `/`
/// (as every [`crate::path_key::PathKey::to_url_path`] result does),
/// without doubling the slash when `base` is the empty root prefix `"/"`.
fn join_url_path(base: &str, rest: &str) -> String {
    if base == "/" {
        rest.to_string()
    } else {
        format!("{base}{rest}")
    }
}

/// Wraps an [`Application`] with filter checks run before the handler
/// (§4.3.5). Rejections return `Ok(None)`; redirects return a `308`
/// [`Response::Status`]-equivalent full response built by the caller.
pub struct FilteredApplication<A: Application> {
    pub filter: FilterConfig,
    pub inner: A,
}

impl<A: Application> FilteredApplication<A> {
    pub fn new(filter: FilterConfig, inner: A) -> Self {
        Self { filter, inner }
    }

    /// Runs the filter only, returning `Some(response)` if the filter
    /// short-circuits (redirect) or `None` to reject (method/limit
    /// violations also surface as `None`, per the handler contract).
    fn filter_check(&self, request: &Request, dispatch: &DispatchInfo) -> FilterOutcome {
        if let Some(methods) = &self.filter.accept_methods
            && !methods.contains(&request.method)
        {
            return FilterOutcome::Reject;
        }
        if let Some(max_depth) = self.filter.max_path_depth
            && dispatch.extra.len() > max_depth
        {
            return FilterOutcome::Reject;
        }
        if let Some(max_len) = self.filter.max_path_length
            && path_length(dispatch) > max_len
        {
            return FilterOutcome::Reject;
        }
        if let Some(max_qlen) = self.filter.max_query_length
            && request.uri.query().map(str::len).unwrap_or(0) > max_qlen
        {
            return FilterOutcome::Reject;
        }

        let comps = dispatch.extra.components();
        let trailing_empty = comps.last().map(|s| s.is_empty()).unwrap_or(false);

        if self.filter.redirect_directories && trailing_empty {
            let extra = dispatch.extra.to_url_path();
            let extra = extra.trim_end_matches('/');
            if !extra.is_empty() {
                return FilterOutcome::Redirect(join_url_path(&dispatch.base.to_url_path(), extra));
            }
        }
        if self.filter.redirect_files && !trailing_empty && !comps.is_empty() {
            let extra = format!("{}/", dispatch.extra.to_url_path());
            return FilterOutcome::Redirect(join_url_path(&dispatch.base.to_url_path(), &extra));
        }

        FilterOutcome::Pass
    }
}

enum FilterOutcome {
    Pass,
    Reject,
    Redirect(String),
}

impl<A: Application> Application for FilteredApplication<A> {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
        Box::pin(async move {
            match self.filter_check(request, dispatch) {
                FilterOutcome::Reject => Ok(None),
                FilterOutcome::Redirect(location) => {
                    use crate::response::FullResponse;
                    let resp = FullResponse::builder(StatusCode::PERMANENT_REDIRECT)
                        .header(http::header::LOCATION, location.into_bytes())
                        .build();
                    Ok(Some(Response::Full(resp)))
                }
                FilterOutcome::Pass => self.inner.handle(request, dispatch).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_key::PathKey;

    struct AlwaysNull;
    impl Application for AlwaysNull {
        fn handle<'a>(&'a self, _request: &'a Request, _dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn dispatch_for(path: &str) -> DispatchInfo {
        DispatchInfo { base: PathKey::empty(), extra: PathKey::from_url_path(path) }
    }

    #[test]
    fn filter_config_rejects_conflicting_redirects() {
        let mut cfg = FilterConfig::default();
        cfg.redirect_directories = true;
        cfg.redirect_files = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn max_path_length_is_monotone() {
        let dispatch = dispatch_for("/foo/bar");
        let len = path_length(&dispatch);
        let pass_small = FilterConfig { max_path_length: Some(len), ..Default::default() };
        let pass_large = FilterConfig { max_path_length: Some(len + 5), ..Default::default() };
        let app_small = FilteredApplication::new(pass_small, AlwaysNull);
        let app_large = FilteredApplication::new(pass_large, AlwaysNull);
        assert!(matches!(app_small.filter_check(&dummy_request(), &dispatch), FilterOutcome::Pass));
        assert!(matches!(app_large.filter_check(&dummy_request(), &dispatch), FilterOutcome::Pass));
    }

    #[test]
    fn redirect_directories_target_has_no_doubled_slash_at_root() {
        let dispatch = dispatch_for("/foo/");
        let cfg = FilterConfig { redirect_directories: true, ..Default::default() };
        let app = FilteredApplication::new(cfg, AlwaysNull);
        match app.filter_check(&dummy_request(), &dispatch) {
            FilterOutcome::Redirect(target) => assert_eq!(target, "/foo"),
            _ => panic!("expected a redirect"),
        }
    }

    #[test]
    fn redirect_files_target_has_no_doubled_slash_at_root() {
        let dispatch = dispatch_for("/foo");
        let cfg = FilterConfig { redirect_files: true, ..Default::default() };
        let app = FilteredApplication::new(cfg, AlwaysNull);
        match app.filter_check(&dummy_request(), &dispatch) {
            FilterOutcome::Redirect(target) => assert_eq!(target, "/foo/"),
            _ => panic!("expected a redirect"),
        }
    }

    fn dummy_request() -> Request {
        use crate::request::RequestContext;
        use crate::config::InterfaceAddress;
        use std::sync::Arc;
        Request {
            method: Method::GET,
            uri: "/foo/bar".parse().unwrap(),
            headers: http::HeaderMap::new(),
            body: bytes::Bytes::new(),
            context: Arc::new(RequestContext {
                interface: InterfaceAddress::for_address("*", 8080),
                remote_origin: "127.0.0.1:1".parse().unwrap(),
                connection_id: "c1".into(),
            }),
            request_id: "r1".into(),
        }
    }
}
