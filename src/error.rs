//! Error taxonomy for the core runtime (see spec §7).

use std::time::Duration;
use thiserror::Error;

/// Configuration errors: caught at construction time, fatal for the component
/// and its parent's start (§7.1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid component name {0:?}: must be nonempty, alphanumeric plus -._, and start/end alphanumeric")]
    InvalidName(String),

    #[error("duplicate child name {0:?} under parent {1:?}")]
    DuplicateName(String, String),

    #[error("interface address must specify exactly one of (address,port) or fd")]
    InterfaceAmbiguous,

    #[error("TLS protocol {0:?} requires at least one hostname")]
    MissingHostnames(String),

    #[error("host record may not set both selfSigned and certificate/privateKey")]
    HostRecordConflict,

    #[error("invalid suffix pattern {0:?}")]
    InvalidSuffixPattern(String),

    #[error("redirectDirectories and redirectFiles are mutually exclusive")]
    FilterRedirectConflict,

    #[error("unknown application {0:?}")]
    UnknownApplication(String),

    #[error("unknown service {0:?}")]
    UnknownService(String),
}

/// Disposition of a single shutdown callback/child stop (§7.5).
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown timed out after {0:?}")]
    Timeout(Duration),

    #[error("shutdown completion signal lost (task panicked or was dropped)")]
    SignalLost,
}

/// Crate-wide runtime error, unifying startup/per-request/session/shutdown/reload
/// failures (§7.2-§7.6).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bind/listen failed on {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("request handling failed: {0}")]
    Request(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    #[error("reload timed out after {0:?}; reload abandoned, server continues running")]
    ReloadTimeout(Duration),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
