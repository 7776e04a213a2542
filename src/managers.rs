//! Application and service managers (§2, §4.1): named registries of
//! applications and services, each a child of the webapp root. Named, typed
//! lookups replace a flat shutdown-hook list; the `join_all`-based
//! parallel-shutdown-with-error-aggregation pattern lives in
//! [`crate::component::Component::stop`].

use crate::application::Application;
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::service::{AccessLog, ConnectionRateLimiter, DataRateLimiter};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Holds named applications (§2 "Application manager").
#[derive(Default)]
pub struct ApplicationManager {
    apps: RwLock<HashMap<String, Arc<dyn Application>>>,
}

impl ApplicationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, app: Arc<dyn Application>) {
        self.apps.write().unwrap().insert(name.into(), app);
    }

    pub fn get(&self, name: &str) -> CoreResult<Arc<dyn Application>> {
        self.apps
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::Config(ConfigError::UnknownApplication(name.to_string())))
    }
}

impl crate::component::ComponentBehavior for ApplicationManager {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A named service handle, one of the three service roles an endpoint may
/// bind (§4.2 "services").
pub enum Service {
    AccessLog(Arc<dyn AccessLog>),
    ConnectionRateLimiter(Arc<dyn ConnectionRateLimiter>),
    DataRateLimiter(Arc<dyn DataRateLimiter>),
}

/// Holds named services (§2 "Service manager").
#[derive(Default)]
pub struct ServiceManager {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, service: Service) {
        self.services.write().unwrap().insert(name.into(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> CoreResult<Arc<Service>> {
        self.services
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::Config(ConfigError::UnknownService(name.to_string())))
    }

    pub fn access_log(&self, name: &str) -> CoreResult<Arc<dyn AccessLog>> {
        match &*self.get(name)? {
            Service::AccessLog(a) => Ok(a.clone()),
            _ => Err(CoreError::Config(ConfigError::UnknownService(name.to_string()))),
        }
    }

    pub fn connection_rate_limiter(&self, name: &str) -> CoreResult<Arc<dyn ConnectionRateLimiter>> {
        match &*self.get(name)? {
            Service::ConnectionRateLimiter(a) => Ok(a.clone()),
            _ => Err(CoreError::Config(ConfigError::UnknownService(name.to_string()))),
        }
    }

    pub fn data_rate_limiter(&self, name: &str) -> CoreResult<Arc<dyn DataRateLimiter>> {
        match &*self.get(name)? {
            Service::DataRateLimiter(a) => Ok(a.clone()),
            _ => Err(CoreError::Config(ConfigError::UnknownService(name.to_string()))),
        }
    }
}

impl crate::component::ComponentBehavior for ServiceManager {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_application_is_config_error() {
        let mgr = ApplicationManager::new();
        assert!(mgr.get("missing").is_err());
    }

    #[test]
    fn registered_application_round_trips() {
        use crate::component::BoxFuture;
        use crate::request::{DispatchInfo, Request};
        use crate::response::Response;

        struct Noop;
        impl Application for Noop {
            fn handle<'a>(&'a self, _r: &'a Request, _d: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
                Box::pin(async { Ok(None) })
            }
        }

        let mgr = ApplicationManager::new();
        mgr.register("noop", Arc::new(Noop));
        assert!(mgr.get("noop").is_ok());
    }
}
