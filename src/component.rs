//! Component framework (§4.1): the supervision tree, lifecycle state
//! machine, name lookup, and concurrent supervised start/stop.

use crate::error::{ConfigError, CoreError, CoreResult};
use crate::logging::Logger;
use futures::future::join_all;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Component lifecycle state (§3 "Component", state machine in §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Initializing => "initializing",
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Absolute, slash-joined name-path from the webapp root to a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePath(Vec<String>);

impl NamePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, name: &str) -> Self {
        let mut v = self.0.clone();
        v.push(name.to_string());
        Self(v)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

/// Validates a component name: nonempty, alphanumerics plus `-._`, must
/// start and end with an alphanumeric character (§4.1 add-child).
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let ok_char = |c: char| c.is_ascii_alphanumeric() || "-._".contains(c);
    let first_last_ok = |c: char| c.is_ascii_alphanumeric();
    if name.is_empty()
        || !name.chars().all(ok_char)
        || !first_last_ok(name.chars().next().unwrap())
        || !first_last_ok(name.chars().next_back().unwrap())
    {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Lifecycle hooks implemented by each concrete node type (endpoint, router,
/// manager, ...). Boxed-future methods follow a `ShutdownHook`-style trait
/// shape rather than pulling in `async-trait`.
pub trait ComponentBehavior: Send + Sync {
    /// Runs exactly once, during the `initializing` -> `stopped` transition.
    fn init(&self) -> BoxFuture<'_, CoreResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs during `starting` -> `running`, after all children have started.
    fn start(&self) -> BoxFuture<'_, CoreResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs during `stopping` -> `stopped`, after all children have stopped.
    /// `will_reload` is forwarded so implementations can stash rather than
    /// free resources (§4.1).
    fn stop(&self, will_reload: bool) -> BoxFuture<'_, CoreResult<()>> {
        let _ = will_reload;
        Box::pin(async { Ok(()) })
    }

    fn as_any(&self) -> &dyn Any;
}

/// A node in the supervision tree (§3 "Component").
pub struct Component {
    name: String,
    name_path: NamePath,
    parent: Mutex<Option<Weak<Component>>>,
    children: RwLock<Vec<Arc<Component>>>,
    state_tx: watch::Sender<State>,
    state_rx: watch::Receiver<State>,
    started_once: std::sync::atomic::AtomicBool,
    logger: Logger,
    behavior: Box<dyn ComponentBehavior>,
    tree: Weak<ComponentTree>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_path(&self) -> &NamePath {
        &self.name_path
    }

    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn behavior(&self) -> &dyn ComponentBehavior {
        self.behavior.as_ref()
    }

    pub fn parent(&self) -> Option<Arc<Component>> {
        self.parent.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// Direct children, in insertion order (§4.1 children-of).
    pub fn children(&self) -> Vec<Arc<Component>> {
        self.children.read().unwrap().clone()
    }

    fn set_state(&self, s: State) {
        let _ = self.state_tx.send(s);
    }

    /// Resolves when the component enters `target` (§4.1 wait-for-state).
    pub async fn wait_for_state(&self, target: State) {
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow() == target {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Attaches `child` under `self`, assigning it a unique name-path and
    /// registering it in the root's context-tree (§4.1 add-child).
    pub fn add_child(self: &Arc<Self>, name: &str, behavior: Box<dyn ComponentBehavior>) -> CoreResult<Arc<Component>> {
        validate_name(name).map_err(CoreError::Config)?;

        let state = self.state();
        let already_started = self.started_once.load(std::sync::atomic::Ordering::SeqCst);
        if state == State::Stopping || (state == State::Stopped && already_started) {
            return Err(CoreError::Invariant(format!(
                "cannot add child {name:?}: parent {} is stopping or stopped after first start",
                self.name_path
            )));
        }

        {
            let children = self.children.read().unwrap();
            if children.iter().any(|c| c.name == name) {
                return Err(CoreError::Config(ConfigError::DuplicateName(
                    name.to_string(),
                    self.name_path.to_string(),
                )));
            }
        }

        let name_path = self.name_path.child(name);
        let (tx, rx) = watch::channel(State::Initializing);
        let child = Arc::new(Component {
            name: name.to_string(),
            name_path: name_path.clone(),
            parent: Mutex::new(Some(Arc::downgrade(self))),
            children: RwLock::new(Vec::new()),
            state_tx: tx,
            state_rx: rx,
            started_once: std::sync::atomic::AtomicBool::new(false),
            logger: Logger::for_path(&name_path),
            behavior,
            tree: self.tree.clone(),
        });

        self.children.write().unwrap().push(child.clone());
        if let Some(tree) = self.tree.upgrade() {
            tree.register(child.clone());
        }
        Ok(child)
    }

    /// Runs the init hook (first entry only), then starts this component and
    /// all its children concurrently (§4.1 start).
    pub async fn start(self: &Arc<Self>) -> CoreResult<()> {
        if self.state() == State::Initializing {
            self.behavior.init().await?;
            self.set_state(State::Stopped);
        }

        if self.state() != State::Stopped {
            return Err(CoreError::Invariant(format!(
                "cannot start {} from state {}",
                self.name_path,
                self.state()
            )));
        }

        self.started_once.store(true, std::sync::atomic::Ordering::SeqCst);
        self.set_state(State::Starting);

        let children = self.children();
        let results = join_all(children.iter().map(|c| {
            let c = c.clone();
            async move { c.start().await }
        }))
        .await;

        if let Some(err) = results.into_iter().find_map(Result::err) {
            self.logger.error(format!("child start failed: {err}; stopping already-started children"));
            self.set_state(State::Stopping);
            for child in &children {
                if matches!(child.state(), State::Running | State::Starting) {
                    let _ = child.stop(false).await;
                }
            }
            self.set_state(State::Stopped);
            return Err(err);
        }

        if let Err(err) = self.behavior.start().await {
            self.set_state(State::Stopping);
            for child in &children {
                let _ = child.stop(false).await;
            }
            self.set_state(State::Stopped);
            return Err(err);
        }

        self.set_state(State::Running);
        Ok(())
    }

    /// Stops this component: concurrently stops children, then runs the stop
    /// hook, then transitions to `stopped` (§4.1 stop). Stop failures are
    /// logged and aggregated into the returned disposition but never abort
    /// the stop sequence itself (§7.4, §7.5).
    pub async fn stop(self: &Arc<Self>, will_reload: bool) -> ShutdownDisposition {
        if self.state() == State::Stopped {
            return ShutdownDisposition::ok();
        }
        self.set_state(State::Stopping);

        let children = self.children();
        let results = join_all(children.iter().map(|c| {
            let c = c.clone();
            async move { c.stop(will_reload).await }
        }))
        .await;

        let mut disposition = ShutdownDisposition::ok();
        for (child, result) in children.iter().zip(results) {
            if !result.is_ok() {
                self.logger.error(format!("child {} failed to stop cleanly", child.name_path()));
            }
            disposition.merge(result);
        }

        if let Err(e) = self.behavior.stop(will_reload).await {
            self.logger.error(format!("stop hook failed: {e}"));
            disposition.push(self.name_path.to_string(), e);
        }

        self.set_state(State::Stopped);
        disposition
    }
}

/// Aggregated outcome of stopping a subtree (§7.5 "shutdown disposition
/// record"): every per-component failure encountered, keyed by name-path.
/// Stop never hard-fails on these; they are reported, not propagated.
#[derive(Debug, Default)]
pub struct ShutdownDisposition {
    pub failures: Vec<(String, CoreError)>,
}

impl ShutdownDisposition {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Panics if any component failed to stop cleanly; for tests and callers
    /// that treat shutdown failures as bugs rather than recoverable outcomes.
    pub fn unwrap(self) {
        if !self.is_ok() {
            panic!("stop failed: {:?}", self.failures);
        }
    }

    fn push(&mut self, name_path: String, error: CoreError) {
        self.failures.push((name_path, error));
    }

    fn merge(&mut self, other: ShutdownDisposition) {
        self.failures.extend(other.failures);
    }
}

/// Back-pointer tree context (§3 "context object"): a flat registry of every
/// component keyed by absolute name-path, shared by the whole tree.
#[derive(Default)]
pub struct ComponentTree {
    by_path: RwLock<HashMap<NamePath, Arc<Component>>>,
}

impl ComponentTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { by_path: RwLock::new(HashMap::new()) })
    }

    fn register(&self, component: Arc<Component>) {
        self.by_path.write().unwrap().insert(component.name_path().clone(), component);
    }

    /// Constructs the webapp root component.
    pub fn new_root(self: &Arc<Self>, behavior: Box<dyn ComponentBehavior>) -> Arc<Component> {
        let (tx, rx) = watch::channel(State::Initializing);
        let root = Arc::new(Component {
            name: String::new(),
            name_path: NamePath::root(),
            parent: Mutex::new(None),
            children: RwLock::new(Vec::new()),
            state_tx: tx,
            state_rx: rx,
            started_once: std::sync::atomic::AtomicBool::new(false),
            logger: Logger::root(),
            behavior,
            tree: Arc::downgrade(self),
        });
        self.register(root.clone());
        root
    }

    /// Resolves an absolute name-path to a component (§4.1 get-component).
    pub fn get(&self, path: &NamePath) -> Option<Arc<Component>> {
        self.by_path.read().unwrap().get(path).cloned()
    }

    /// Resolves an absolute name-path to a component, verifying its concrete
    /// behavior type; fails if not found or the type does not match (§4.1
    /// get-component's `requiredType`).
    pub fn get_as<T: 'static>(&self, path: &NamePath) -> CoreResult<Arc<Component>> {
        let component = self
            .get(path)
            .ok_or_else(|| CoreError::Invariant(format!("no component at {path}")))?;
        if component.behavior().as_any().is::<T>() {
            Ok(component)
        } else {
            Err(CoreError::Invariant(format!(
                "component at {path} is not a {}",
                std::any::type_name::<T>()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl ComponentBehavior for Noop {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("foo-bar.baz_1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[tokio::test]
    async fn lifecycle_monotonicity() {
        let tree = ComponentTree::new();
        let root = tree.new_root(Box::new(Noop));
        assert_eq!(root.state(), State::Initializing);
        root.start().await.unwrap();
        assert_eq!(root.state(), State::Running);
        root.stop(false).await.unwrap();
        assert_eq!(root.state(), State::Stopped);
    }

    #[tokio::test]
    async fn children_start_before_parent_running() {
        let tree = ComponentTree::new();
        let root = tree.new_root(Box::new(Noop));
        let _child = root.add_child("child", Box::new(Noop)).unwrap();
        root.start().await.unwrap();
        assert_eq!(root.state(), State::Running);
        assert_eq!(root.children()[0].state(), State::Running);
    }

    #[tokio::test]
    async fn duplicate_sibling_name_rejected() {
        let tree = ComponentTree::new();
        let root = tree.new_root(Box::new(Noop));
        root.add_child("a", Box::new(Noop)).unwrap();
        assert!(root.add_child("a", Box::new(Noop)).is_err());
    }
}
