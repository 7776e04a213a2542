//! Endpoints and the endpoint manager (§2, §3 "Endpoint", §4.2).

pub mod dispatch;
pub mod stash;
pub mod wrangler;

use crate::config::EndpointConfig;
use crate::error::{CoreError, CoreResult};
use crate::host::HostManager;
use crate::managers::{ApplicationManager, ServiceManager};
use dispatch::dispatch_and_log;
use stash::SocketStash;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use wrangler::ProtocolWrangler;

/// Grace period for each phase of HTTP/2 session shutdown (§4.2, §5
/// defaults): close, then destroy, each bounded by this duration — an
/// overall budget of roughly 2x this value.
pub const DEFAULT_SESSION_CLOSE_GRACE: Duration = Duration::from_millis(250);
pub const DEFAULT_STASH_TIMEOUT: Duration = stash::DEFAULT_STASH_TIMEOUT;

struct RunningEndpoint {
    cancel: CancellationToken,
    will_reload: Arc<AtomicBool>,
    accept_task: tokio::task::JoinHandle<()>,
}

/// One listening socket bound to one protocol, zero or more hostnames, and
/// one application (§3 "Endpoint"). Implements [`crate::component::ComponentBehavior`]
/// so it is driven by the supervision tree like any other node.
pub struct Endpoint {
    config: EndpointConfig,
    wrangler: Arc<ProtocolWrangler>,
    stash: Arc<SocketStash>,
    running: AsyncMutex<Option<RunningEndpoint>>,
    started: AtomicBool,
}

impl Endpoint {
    pub fn new(
        config: EndpointConfig,
        applications: Arc<ApplicationManager>,
        services: &ServiceManager,
        hosts: &Arc<HostManager>,
        stash: Arc<SocketStash>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::Config)?;

        let access_log = config
            .services
            .access_log
            .as_deref()
            .map(|name| services.access_log(name))
            .transpose()?;
        let connection_rate_limiter = config
            .services
            .connection_rate_limiter
            .as_deref()
            .map(|name| services.connection_rate_limiter(name))
            .transpose()?;
        let data_rate_limiter = config
            .services
            .data_rate_limiter
            .as_deref()
            .map(|name| services.data_rate_limiter(name))
            .transpose()?;

        let tls_acceptor = if config.protocol.is_tls() {
            Some(wrangler::tls_acceptor_for(hosts.cert_resolver()))
        } else {
            None
        };

        let wrangler = ProtocolWrangler::new(
            &config,
            tls_acceptor,
            applications,
            access_log,
            connection_rate_limiter,
            data_rate_limiter,
        );

        Ok(Self {
            config,
            wrangler: Arc::new(wrangler),
            stash,
            running: AsyncMutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn active_session_count(&self) -> usize {
        self.wrangler.sessions().len()
    }
}

impl crate::component::ComponentBehavior for Endpoint {
    fn start(&self) -> crate::component::BoxFuture<'_, CoreResult<()>> {
        Box::pin(async move {
            let listener = self.wrangler.bind(&self.stash, DEFAULT_STASH_TIMEOUT).await?;
            let cancel = CancellationToken::new();
            let will_reload = Arc::new(AtomicBool::new(false));
            let wrangler = self.wrangler.clone();
            let stash = self.stash.clone();
            let task_cancel = cancel.clone();
            let task_will_reload = will_reload.clone();
            let accept_task = tokio::spawn(async move {
                wrangler.serve(listener, task_cancel, task_will_reload, stash).await;
            });
            *self.running.lock().await = Some(RunningEndpoint { cancel, will_reload, accept_task });
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Stops the accept loop. On a true stop (`will_reload == false`), also
    /// runs the two-phase session teardown (§4.2): signal every session to
    /// close gracefully, wait one grace period, destroy whatever remains,
    /// wait one more grace period, and log any sessions still alive past that
    /// as undead rather than block shutdown on them (§9 "HTTP/2 session
    /// shutdown bug workaround"). On reload, in-flight sessions are left
    /// running untouched — only the listening socket changes hands, handed to
    /// the successor via the stash (§4.2 "(non-reload)" scoping).
    fn stop(&self, will_reload: bool) -> crate::component::BoxFuture<'_, CoreResult<()>> {
        Box::pin(async move {
            let Some(running) = self.running.lock().await.take() else {
                return Ok(());
            };
            running.will_reload.store(will_reload, Ordering::SeqCst);
            running.cancel.cancel();
            let _ = running.accept_task.await;

            if will_reload {
                return Ok(());
            }

            let sessions = self.wrangler.sessions();
            sessions.close_all();
            if sessions.wait_for_empty(DEFAULT_SESSION_CLOSE_GRACE).await {
                return Ok(());
            }

            sessions.destroy_all();
            if !sessions.wait_for_empty(DEFAULT_SESSION_CLOSE_GRACE).await {
                log::warn!(
                    "{} session(s) still undead after close+destroy grace periods; proceeding",
                    sessions.len()
                );
            }
            Ok(())
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Supervises every endpoint (§2 "Endpoint manager"). A thin
/// [`crate::component::ComponentBehavior`] wrapper: the supervision tree
/// already starts/stops endpoint children concurrently, so this manager only
/// needs to exist as the attachment point and name-path anchor.
#[derive(Default)]
pub struct EndpointManager;

impl EndpointManager {
    pub fn new() -> Self {
        Self
    }
}

impl crate::component::ComponentBehavior for EndpointManager {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Directly dispatches one request against an endpoint's bound application,
/// bypassing the socket layer (used by embedders driving the core from an
/// already-decoded request, and by tests).
pub async fn dispatch_on(
    endpoint: &Endpoint,
    applications: &ApplicationManager,
    request: &crate::request::Request,
    access_log: Option<Arc<dyn crate::service::AccessLog>>,
) -> crate::response::FullResponse {
    dispatch_and_log(applications, &endpoint.config.application, request, access_log).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InterfaceAddress, Protocol};

    #[test]
    fn endpoint_construction_validates_tls_hostnames() {
        let apps = Arc::new(ApplicationManager::new());
        let services = ServiceManager::new();
        let hosts = Arc::new(HostManager::new());
        let stash = Arc::new(SocketStash::new());

        let config = EndpointConfig {
            interface: InterfaceAddress::for_address("*", 8443),
            protocol: Protocol::Https,
            hostnames: Vec::new(),
            application: "root".into(),
            services: Default::default(),
        };

        let result = Endpoint::new(config, apps, &services, &hosts, stash);
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_construction_succeeds_for_plain_http() {
        let apps = Arc::new(ApplicationManager::new());
        let services = ServiceManager::new();
        let hosts = Arc::new(HostManager::new());
        let stash = Arc::new(SocketStash::new());

        let config = EndpointConfig {
            interface: InterfaceAddress::for_address("*", 8080),
            protocol: Protocol::Http,
            hostnames: Vec::new(),
            application: "root".into(),
            services: Default::default(),
        };

        let endpoint = Endpoint::new(config, apps, &services, &hosts, stash).unwrap();
        assert_eq!(endpoint.active_session_count(), 0);
    }
}
