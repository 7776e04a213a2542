//! Service interfaces the core queries (§6): access logging and rate
//! limiting. Concrete implementations are out of scope (§1); only the
//! interfaces are specified here.

use crate::component::BoxFuture;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// One completed request, as reported to an access-log service (§6
/// "Access-log contract").
#[derive(Debug, Clone)]
pub struct AccessLogRecord {
    pub request_id: String,
    pub connection_id: String,
    pub method: http::Method,
    pub path: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub duration_ms: u64,
}

/// `logCompleted(record)` invoked exactly once per completed request (§6).
pub trait AccessLog: Send + Sync {
    fn log_completed<'a>(&'a self, record: AccessLogRecord) -> BoxFuture<'a, ()>;
}

/// `admit() -> boolean` (§6 "Rate-limiter contracts").
pub trait ConnectionRateLimiter: Send + Sync {
    fn admit(&self) -> bool;
}

/// Boxed bidirectional byte stream, used as the wrap target/result for a
/// data-rate-limiting socket wrapper.
pub type BoxedStream = Pin<Box<dyn AsyncReadWrite + Send>>;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// `wrap(socket) -> socket` (§6 "Rate-limiter contracts").
pub trait DataRateLimiter: Send + Sync {
    fn wrap(&self, socket: BoxedStream) -> BoxedStream;
}

/// Admission outcome used by the endpoint's accept loop (§4.2 step 1).
pub fn admit_connection(limiter: Option<&dyn ConnectionRateLimiter>) -> bool {
    limiter.map(|l| l.admit()).unwrap_or(true)
}
