//! Connection acceptance and HTTP decode (§4.2 "accept loop", "HTTP/2 session
//! close"): binds a listener, optionally terminates TLS, and serves HTTP/1 or
//! HTTP/2 over it via `hyper`, tracking live sessions for graceful two-phase
//! shutdown.

use crate::config::{EndpointConfig, InterfaceAddress, Protocol};
use crate::endpoint::dispatch::dispatch_and_log;
use crate::endpoint::stash::SocketStash;
use crate::error::{CoreError, CoreResult};
use crate::managers::ApplicationManager;
use crate::request::{Request as CoreRequest, RequestContext};
use crate::response::{BodySource, FullResponse};
use crate::service::{admit_connection, AccessLog, BoxedStream, ConnectionRateLimiter, DataRateLimiter};
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

struct SessionEntry {
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Tracks live connections for one endpoint so a reload/stop can wait for, or
/// force, their end (§3 "Session", §4.2, §8 "any-sessions condition").
pub struct SessionRegistry {
    sessions: DashMap<u64, SessionEntry>,
    next_id: AtomicU64,
    empty: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new(), next_id: AtomicU64::new(1), empty: Notify::new() }
    }

    fn register(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.sessions.insert(id, SessionEntry { cancel: cancel.clone(), handle: std::sync::Mutex::new(None) });
        (id, cancel)
    }

    /// Attaches the spawned task's `JoinHandle` to an already-registered
    /// session so [`destroy_all`](Self::destroy_all) can abort it later. A
    /// no-op if the session already ended and unregistered itself.
    fn set_handle(&self, id: u64, handle: tokio::task::JoinHandle<()>) {
        if let Some(entry) = self.sessions.get(&id) {
            *entry.handle.lock().unwrap() = Some(handle);
        }
    }

    fn unregister(&self, id: u64) {
        self.sessions.remove(&id);
        if self.sessions.is_empty() {
            self.empty.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Signals every open session to begin a graceful close (§4.2 "close",
    /// step 1 of the two-phase shutdown).
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.cancel.cancel();
        }
    }

    /// Forcibly aborts every session still registered (§4.2 "destroy", step 2
    /// of the two-phase shutdown) — used once the close-grace period has
    /// elapsed and some sessions remain. Aborted tasks never reach their own
    /// `unregister` call, so this removes them from the registry directly.
    pub fn destroy_all(&self) {
        let ids: Vec<u64> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.sessions.remove(&id)
                && let Some(handle) = entry.handle.lock().unwrap().take()
            {
                handle.abort();
            }
        }
        if self.sessions.is_empty() {
            self.empty.notify_waiters();
        }
    }

    /// Waits until every session has ended or `grace` elapses, whichever
    /// comes first; returns `true` if all sessions drained in time.
    pub async fn wait_for_empty(&self, grace: Duration) -> bool {
        if self.sessions.is_empty() {
            return true;
        }
        tokio::time::timeout(grace, async {
            while !self.sessions.is_empty() {
                self.empty.notified().await;
            }
        })
        .await
        .is_ok()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts connections on one interface and serves HTTP/1 or HTTP/2 requests
/// over them, dispatching each to a single bound application (§3 "Endpoint").
pub struct ProtocolWrangler {
    interface: InterfaceAddress,
    tls_acceptor: Option<TlsAcceptor>,
    applications: Arc<ApplicationManager>,
    application_name: String,
    access_log: Option<Arc<dyn AccessLog>>,
    connection_rate_limiter: Option<Arc<dyn ConnectionRateLimiter>>,
    data_rate_limiter: Option<Arc<dyn DataRateLimiter>>,
    sessions: Arc<SessionRegistry>,
}

impl ProtocolWrangler {
    pub fn new(
        config: &EndpointConfig,
        tls_acceptor: Option<TlsAcceptor>,
        applications: Arc<ApplicationManager>,
        access_log: Option<Arc<dyn AccessLog>>,
        connection_rate_limiter: Option<Arc<dyn ConnectionRateLimiter>>,
        data_rate_limiter: Option<Arc<dyn DataRateLimiter>>,
    ) -> Self {
        debug_assert_eq!(config.protocol.is_tls(), tls_acceptor.is_some());
        Self {
            interface: config.interface.clone(),
            tls_acceptor,
            applications,
            application_name: config.application.clone(),
            access_log,
            connection_rate_limiter,
            data_rate_limiter,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        self.sessions.clone()
    }

    /// Binds a fresh listener for this wrangler's interface, adopting a
    /// stashed one instead when present (§4.2 "Reload-preserving sockets").
    pub async fn bind(&self, stash: &SocketStash, stash_timeout: Duration) -> CoreResult<TcpListener> {
        if let Some(std_listener) = stash.adopt(&self.interface, stash_timeout) {
            std_listener
                .set_nonblocking(true)
                .map_err(|e| CoreError::Bind(format!("{:?}", self.interface), e))?;
            return TcpListener::from_std(std_listener).map_err(|e| CoreError::Bind(format!("{:?}", self.interface), e));
        }
        let addr = self.socket_addr()?;
        TcpListener::bind(addr).await.map_err(|e| CoreError::Bind(addr.to_string(), e))
    }

    fn socket_addr(&self) -> CoreResult<SocketAddr> {
        let host = match self.interface.address.as_deref() {
            Some("*") | None => "0.0.0.0",
            Some(other) => other,
        };
        let port = self
            .interface
            .port
            .ok_or_else(|| CoreError::Invariant("interface has no port to bind".into()))?;
        format!("{host}:{port}")
            .parse()
            .map_err(|_| CoreError::Invariant(format!("invalid interface address {host:?}")))
    }

    /// Runs the accept loop until `cancel` fires. When the loop stops because
    /// of a reload, the still-open listener is stashed for the incoming
    /// endpoint to adopt; otherwise it is dropped, closing the socket (§4.2
    /// steps 1-4, §4.2 "sockets are always closed, never stashed" on a
    /// non-reload stop).
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken, will_reload: Arc<AtomicBool>, stash: Arc<SocketStash>) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => self.spawn_connection(stream, remote),
                        Err(e) => log::warn!("accept failed on {:?}: {e}", self.interface),
                    }
                }
            }
        }
        if !will_reload.load(Ordering::SeqCst) {
            log::debug!("closing listener on {:?}", self.interface);
            return;
        }
        match listener.into_std() {
            Ok(std_listener) => stash.stash(self.interface.clone(), std_listener),
            Err(e) => log::warn!("failed to reclaim listener for stashing: {e}"),
        }
    }

    /// Accepts, admits, and dispatches one connection (§4.2 step 1: consult
    /// the connection rate limiter before doing anything else).
    fn spawn_connection(&self, stream: tokio::net::TcpStream, remote: SocketAddr) {
        if !admit_connection(self.connection_rate_limiter.as_deref()) {
            log::debug!("connection from {remote} rejected by rate limiter");
            return;
        }
        let _ = stream.set_nodelay(true);
        let tls_acceptor = self.tls_acceptor.clone();
        let data_rate_limiter = self.data_rate_limiter.clone();
        let applications = self.applications.clone();
        let application_name = self.application_name.clone();
        let access_log = self.access_log.clone();
        let sessions = self.sessions.clone();
        let interface = self.interface.clone();

        let (id, session_cancel) = sessions.register();
        let task_sessions = sessions.clone();
        let handle = tokio::spawn(async move {
            let boxed: BoxedStream = match data_rate_limiter {
                Some(limiter) => limiter.wrap(Box::pin(stream)),
                None => Box::pin(stream),
            };

            let result = match tls_acceptor {
                Some(acceptor) => match acceptor.accept(boxed).await {
                    Ok(tls_stream) => {
                        serve_connection(
                            TokioIo::new(tls_stream),
                            remote,
                            interface.clone(),
                            applications,
                            application_name,
                            access_log,
                            session_cancel,
                        )
                        .await
                    }
                    Err(e) => {
                        log::warn!("TLS handshake failed from {remote}: {e}");
                        Ok(())
                    }
                },
                None => {
                    serve_connection(
                        TokioIo::new(boxed),
                        remote,
                        interface.clone(),
                        applications,
                        application_name,
                        access_log,
                        session_cancel,
                    )
                    .await
                }
            };
            if let Err(e) = result {
                log::debug!("connection from {remote} ended: {e}");
            }
            task_sessions.unregister(id);
        });
        sessions.set_handle(id, handle);
    }
}

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);
static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Idle session timeout (§4.2 "HTTP/2 session tracking"): no request activity
/// for 5 minutes closes the session. Applied uniformly to every protocol
/// rather than only `http2`, since `hyper`'s auto connection builder
/// negotiates HTTP/1.1 vs HTTP/2 transparently and gives no separate hook per
/// protocol.
const IDLE_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

async fn serve_connection<I>(
    io: I,
    remote: SocketAddr,
    interface: InterfaceAddress,
    applications: Arc<ApplicationManager>,
    application_name: String,
    access_log: Option<Arc<dyn AccessLog>>,
    session_cancel: CancellationToken,
) -> std::io::Result<()>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let connection_id = format!("{remote}-{}", CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed));
    let activity = Arc::new(Notify::new());

    let service = service_fn(move |req: hyper::Request<Incoming>| {
        let applications = applications.clone();
        let application_name = application_name.clone();
        let access_log = access_log.clone();
        let interface = interface.clone();
        let connection_id = connection_id.clone();
        let activity = activity.clone();
        async move {
            let response =
                handle_one(req, interface, remote, connection_id, &applications, &application_name, access_log).await;
            activity.notify_one();
            Ok::<_, std::convert::Infallible>(to_hyper_response(response).await)
        }
    });

    let conn = AutoBuilder::new(TokioExecutor::new()).serve_connection(io, service);
    tokio::pin!(conn);

    let idle = tokio::time::sleep(IDLE_SESSION_TIMEOUT);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            res = conn.as_mut() => return res.map_err(|e| std::io::Error::other(e.to_string())),
            _ = session_cancel.cancelled() => {
                conn.as_mut().graceful_shutdown();
                return conn.await.map_err(|e| std::io::Error::other(e.to_string()));
            }
            _ = activity.notified() => {
                idle.as_mut().reset(tokio::time::Instant::now() + IDLE_SESSION_TIMEOUT);
            }
            _ = &mut idle => {
                log::debug!("connection from {remote} idle for {IDLE_SESSION_TIMEOUT:?}; closing");
                conn.as_mut().graceful_shutdown();
                return conn.await.map_err(|e| std::io::Error::other(e.to_string()));
            }
        }
    }
}

async fn handle_one(
    req: hyper::Request<Incoming>,
    interface: InterfaceAddress,
    remote: SocketAddr,
    connection_id: String,
    applications: &ApplicationManager,
    application_name: &str,
    access_log: Option<Arc<dyn AccessLog>>,
) -> FullResponse {
    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            log::warn!("failed to read request body from {remote}: {e}");
            Bytes::new()
        }
    };

    let request_id = format!("req-{}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed));

    let request = CoreRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body: body_bytes,
        context: Arc::new(RequestContext { interface, remote_origin: remote, connection_id }),
        request_id,
    };

    dispatch_and_log(applications, application_name, &request, access_log).await
}

/// Reads a response body into memory, slicing a file source to its range if
/// one was set by the adjustment pipeline (§4.4 range handling).
async fn resolve_body(source: &BodySource) -> std::io::Result<Bytes> {
    match source {
        BodySource::Buffer(b) => Ok(b.clone()),
        BodySource::File { path, range, .. } => {
            let bytes = tokio::fs::read(path).await?;
            Ok(match range {
                Some((start, end)) => Bytes::copy_from_slice(&bytes[*start as usize..*end as usize]),
                None => Bytes::from(bytes),
            })
        }
    }
}

async fn to_hyper_response(resp: FullResponse) -> hyper::Response<Full<Bytes>> {
    let body = match &resp.body {
        Some(source) => resolve_body(source).await.unwrap_or_else(|e| {
            log::warn!("failed to read response body: {e}");
            Bytes::new()
        }),
        None => Bytes::new(),
    };

    let mut builder = hyper::Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = resp.headers;
    }
    builder.body(Full::new(body)).unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::new())))
}

/// Builds a server-side TLS acceptor for an endpoint, resolving per-SNI
/// credentials via the host manager (§4.2, §4.5).
pub fn tls_acceptor_for(resolver: Arc<dyn rustls::server::ResolvesServerCert>) -> TlsAcceptor {
    let mut server_config = rustls::ServerConfig::builder().with_no_client_auth().with_cert_resolver(resolver);
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    TlsAcceptor::from(Arc::new(server_config))
}

pub fn protocol_requires_tls(protocol: Protocol) -> bool {
    protocol.is_tls()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_empty_returns_immediately_with_no_sessions() {
        let registry = SessionRegistry::new();
        assert!(registry.wait_for_empty(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn close_all_cancels_every_session_token() {
        let registry = SessionRegistry::new();
        let (_, cancel_a) = registry.register();
        let (_, cancel_b) = registry.register();
        registry.close_all();
        assert!(cancel_a.is_cancelled());
        assert!(cancel_b.is_cancelled());
    }

    #[tokio::test]
    async fn destroy_all_aborts_handles_and_empties_registry() {
        let registry = SessionRegistry::new();
        let (id, _cancel) = registry.register();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        registry.set_handle(id, handle);
        assert_eq!(registry.len(), 1);

        registry.destroy_all();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn wait_for_empty_times_out_when_session_never_unregisters() {
        let registry = SessionRegistry::new();
        let (_id, _cancel) = registry.register();
        let drained = registry.wait_for_empty(Duration::from_millis(20)).await;
        assert!(!drained);
    }

    #[tokio::test]
    async fn wait_for_empty_resolves_once_unregistered() {
        let registry = Arc::new(SessionRegistry::new());
        let (id, _cancel) = registry.register();
        let registry_bg = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry_bg.unregister(id);
        });
        assert!(registry.wait_for_empty(Duration::from_secs(5)).await);
    }
}
