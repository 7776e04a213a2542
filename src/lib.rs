//! Core supervision tree, routing, and protocol runtime (§1 "core
//! responsibilities"). This crate owns the component tree, request
//! dispatch/routing, response adjustment, and endpoint/connection handling;
//! configuration loading, CLI wiring, and host-process signal plumbing stay
//! the embedder's job (§1 Non-goals) — this module supplies the seams they
//! attach to.

pub mod adjust;
pub mod application;
pub mod callback_list;
pub mod cli;
pub mod component;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod logging;
pub mod managers;
pub mod path_key;
pub mod request;
pub mod response;
pub mod routing;
pub mod service;
pub mod tree_map;

pub use cli::Cli;
pub use error::{CoreError, CoreResult};

use component::{Component, ComponentBehavior, ComponentTree, NamePath, State};
use config::{EndpointConfig, HostRecord};
use endpoint::stash::SocketStash;
use endpoint::{Endpoint, EndpointManager};
use host::{HostManager, SelfSignedIssuer};
use managers::{ApplicationManager, Service, ServiceManager};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct RootBehavior;
impl ComponentBehavior for RootBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wires up one webapp root (§2, §4.1): a single root component with four
/// well-known children — application manager, service manager, host manager,
/// endpoint manager — each resolvable by name-path.
pub struct WebappRoot {
    tree: Arc<ComponentTree>,
    root: Arc<Component>,
    applications: Arc<ApplicationManager>,
    services: Arc<ServiceManager>,
    hosts: Arc<HostManager>,
    endpoints_path: NamePath,
    stash: Arc<SocketStash>,
    stash_sweeper_cancel: CancellationToken,
}

impl WebappRoot {
    pub fn new() -> CoreResult<Self> {
        let tree = ComponentTree::new();
        let root = tree.new_root(Box::new(RootBehavior));

        let applications = Arc::new(ApplicationManager::new());
        let services = Arc::new(ServiceManager::new());
        let hosts = Arc::new(HostManager::new());

        root.add_child("applications", Box::new(ApplicationManagerBehavior(applications.clone())))?;
        root.add_child("services", Box::new(ServiceManagerBehavior(services.clone())))?;
        root.add_child("hosts", Box::new(HostManagerBehavior(hosts.clone())))?;
        let endpoints = root.add_child("endpoints", Box::new(EndpointManager::new()))?;

        let stash = Arc::new(SocketStash::new());
        let stash_sweeper_cancel = CancellationToken::new();
        endpoint::stash::spawn_sweeper(stash.clone(), endpoint::DEFAULT_STASH_TIMEOUT, stash_sweeper_cancel.clone());

        Ok(Self {
            tree,
            endpoints_path: endpoints.name_path().clone(),
            root,
            applications,
            services,
            hosts,
            stash,
            stash_sweeper_cancel,
        })
    }

    pub fn applications(&self) -> &Arc<ApplicationManager> {
        &self.applications
    }

    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    pub fn hosts(&self) -> &Arc<HostManager> {
        &self.hosts
    }

    pub fn register_application(&self, name: impl Into<String>, app: Arc<dyn application::Application>) {
        self.applications.register(name, app);
    }

    pub fn register_service(&self, name: impl Into<String>, service: Service) {
        self.services.register(name, service);
    }

    pub fn add_host(&self, record: HostRecord, issuer: &dyn SelfSignedIssuer) -> CoreResult<()> {
        self.hosts.add(record, issuer)
    }

    /// Adds a new endpoint as a child of the endpoint manager (§2, §3
    /// "Endpoint"). `name` must be a valid component name and unique among
    /// endpoints already added before the tree has started.
    pub fn add_endpoint(&self, name: &str, config: EndpointConfig) -> CoreResult<Arc<Component>> {
        let endpoints = self
            .tree
            .get(&self.endpoints_path)
            .ok_or_else(|| CoreError::Invariant("endpoint manager missing from tree".into()))?;
        let endpoint = Endpoint::new(config, self.applications.clone(), &self.services, &self.hosts, self.stash.clone())?;
        endpoints.add_child(name, Box::new(endpoint))
    }

    pub fn state(&self) -> State {
        self.root.state()
    }

    pub async fn wait_for_state(&self, target: State) {
        self.root.wait_for_state(target).await;
    }

    /// Starts the whole tree (§4.1 start): application/service/host managers
    /// have no dependents to wait on, so ordering among root children beyond
    /// the tree's own concurrent fan-out does not matter here.
    pub async fn start(self: &Arc<Self>) -> CoreResult<()> {
        self.root.start().await
    }

    /// Stops the whole tree (§4.1 stop). `will_reload` is forwarded to every
    /// endpoint so listening sockets are stashed rather than closed. Returns
    /// the aggregated shutdown disposition (§7.5); stop itself never fails.
    ///
    /// The stash sweeper keeps running across a reload stop, since the stash
    /// is process-wide and a successor endpoint may still need to adopt a
    /// socket from it; it is only torn down here on a true (non-reload) stop.
    pub async fn stop(self: &Arc<Self>, will_reload: bool) -> component::ShutdownDisposition {
        let disposition = self.root.stop(will_reload).await;
        if !will_reload {
            self.stash_sweeper_cancel.cancel();
        }
        disposition
    }
}

struct ApplicationManagerBehavior(Arc<ApplicationManager>);
impl ComponentBehavior for ApplicationManagerBehavior {
    fn as_any(&self) -> &dyn Any {
        self.0.as_ref()
    }
}

struct ServiceManagerBehavior(Arc<ServiceManager>);
impl ComponentBehavior for ServiceManagerBehavior {
    fn as_any(&self) -> &dyn Any {
        self.0.as_ref()
    }
}

struct HostManagerBehavior(Arc<HostManager>);
impl ComponentBehavior for HostManagerBehavior {
    fn as_any(&self) -> &dyn Any {
        self.0.as_ref()
    }
}

/// Runs a webapp root end to end: starts it, waits for either a host signal
/// (via `shutdown_signal`) or `--maxRunTimeSec`, then stops it within the
/// `--shutdown-timeout-secs` bound (§6 CLI surface, §7.6).
///
/// `shutdown_signal` is supplied by the embedder (§1 "host-process signal
/// handling — the core exposes `reload`, `stop` hooks that a signal driver
/// invokes"); [`wait_for_shutdown_signal`] is provided as the default.
pub async fn run<F>(root: Arc<WebappRoot>, cli: &Cli, shutdown_signal: F) -> CoreResult<()>
where
    F: std::future::Future<Output = ()>,
{
    logging::init(cli.log_to_stdout);

    root.start().await?;
    log::info!("webapp root running");

    match cli.max_run_time() {
        Some(max_run_time) => {
            tokio::select! {
                _ = shutdown_signal => log::info!("shutdown signal received"),
                _ = tokio::time::sleep(max_run_time) => log::info!("max run time of {max_run_time:?} elapsed"),
            }
        }
        None => {
            shutdown_signal.await;
            log::info!("shutdown signal received");
        }
    }

    let timeout = cli.shutdown_timeout();
    match tokio::time::timeout(timeout, root.stop(false)).await {
        Ok(disposition) if disposition.is_ok() => Ok(()),
        Ok(disposition) => {
            for (path, error) in &disposition.failures {
                log::error!("shutdown failure at {path}: {error}");
            }
            Err(CoreError::Invariant(format!("{} component(s) failed to stop cleanly", disposition.failures.len())))
        }
        Err(_) => Err(CoreError::Shutdown(error::ShutdownError::Timeout(timeout))),
    }
}

/// Waits for SIGTERM/SIGINT (or the Windows console-control equivalents).
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {e}");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to install SIGINT handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => log::info!("received SIGTERM"),
            _ = sigint.recv() => log::info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        use tokio::signal::windows;

        let Ok(mut ctrl_c) = windows::ctrl_c() else { return };
        let Ok(mut ctrl_break) = windows::ctrl_break() else { return };
        let Ok(mut ctrl_close) = windows::ctrl_close() else { return };

        tokio::select! {
            _ = ctrl_c.recv() => log::info!("received CTRL+C"),
            _ = ctrl_break.recv() => log::info!("received CTRL+BREAK"),
            _ = ctrl_close.recv() => log::info!("received CTRL+CLOSE"),
        }
    }
}

pub const DEFAULT_STASH_TIMEOUT: Duration = endpoint::DEFAULT_STASH_TIMEOUT;
