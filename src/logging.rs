//! Per-component logger handles (§9 "proxies for logger sub-scopes").
//!
//! Wraps the flat `log::info!`/`log::warn!`/`log::error!` call style in a
//! handle that prefixes every record with the owning component's
//! name-path, instead of a generated-attribute logger proxy.

use crate::component::NamePath;
use std::fmt;

/// A thread-safe handle that emits `log` records tagged with a component's
/// name-path. Cloning is cheap; sub-loggers are created by name rather than
/// generated attribute access (§9).
#[derive(Clone, Debug)]
pub struct Logger {
    path: String,
}

impl Logger {
    pub fn root() -> Self {
        Self { path: String::new() }
    }

    pub fn for_path(path: &NamePath) -> Self {
        Self { path: path.to_string() }
    }

    /// Derives a sub-logger scoped to an additional name segment, e.g. a
    /// per-connection or per-session logger under an endpoint's logger.
    pub fn sub(&self, segment: impl fmt::Display) -> Self {
        if self.path.is_empty() {
            Self { path: segment.to_string() }
        } else {
            Self { path: format!("{}.{}", self.path, segment) }
        }
    }

    pub fn info(&self, msg: impl fmt::Display) {
        log::info!("[{}] {}", self.path, msg);
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        log::warn!("[{}] {}", self.path, msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        log::error!("[{}] {}", self.path, msg);
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        log::debug!("[{}] {}", self.path, msg);
    }
}

/// Installs the process-wide logger via
/// `env_logger::Builder::from_default_env()`.
pub fn init(log_to_stdout: bool) {
    use std::io::Write;

    let mut builder = env_logger::Builder::from_default_env();
    if log_to_stdout {
        builder.target(env_logger::Target::Stdout);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:5} {}",
            chrono::Utc::now().to_rfc3339(),
            record.level(),
            record.args()
        )
    });
    let _ = builder.try_init();
}
