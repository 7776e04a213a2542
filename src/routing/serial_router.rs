//! Serial router (§4.3.4): an ordered list of applications, first non-`null`
//! result wins.

use crate::application::Application;
use crate::component::BoxFuture;
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::managers::ApplicationManager;
use crate::request::{DispatchInfo, Request};
use crate::response::Response;
use std::sync::{Arc, RwLock};

pub struct SerialRouter {
    apps: Arc<ApplicationManager>,
    order: RwLock<Vec<String>>,
}

impl SerialRouter {
    pub fn new(apps: Arc<ApplicationManager>) -> Self {
        Self { apps, order: RwLock::new(Vec::new()) }
    }

    pub fn push(&self, application: impl Into<String>) {
        self.order.write().unwrap().push(application.into());
    }
}

impl Application for SerialRouter {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
        Box::pin(async move {
            let order = self.order.read().unwrap().clone();
            for name in order {
                let app = self
                    .apps
                    .get(&name)
                    .map_err(|_| CoreError::Config(ConfigError::UnknownApplication(name.clone())))?;
                if let Some(resp) = app.handle(request, dispatch).await? {
                    return Ok(Some(resp));
                }
            }
            Ok(None)
        })
    }
}
