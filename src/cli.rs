//! CLI surface (§6): the knobs the core exposes to whatever process wires up
//! signal handling and configuration loading, using a `clap::Parser`
//! derive-based surface.

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log to stdout instead of (or in addition to) the configured log files.
    #[arg(long = "logToStdout")]
    pub log_to_stdout: bool,

    /// Forcibly stop the server after this many seconds, regardless of
    /// activity. Absent means run indefinitely.
    #[arg(long = "maxRunTimeSec", value_name = "SECONDS")]
    pub max_run_time_secs: Option<u64>,

    /// Debug-only fault injector: comma-separated component name-paths to
    /// fail on their next start, for exercising startup-error handling.
    #[arg(long = "earlyErrors", value_name = "PATHS")]
    pub early_errors: Option<String>,

    /// Graceful shutdown timeout in seconds, applied to the aggregate
    /// callback-list run at stop/reload (§7.5).
    #[arg(long, value_name = "SECONDS", default_value = "10")]
    pub shutdown_timeout_secs: u64,
}

impl Cli {
    pub fn max_run_time(&self) -> Option<Duration> {
        self.max_run_time_secs.map(Duration::from_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Parses `--earlyErrors` into the set of name-paths to fail, ignored
    /// outside debug builds (§6 "debug-only error injector").
    pub fn early_error_paths(&self) -> Vec<String> {
        if !cfg!(debug_assertions) {
            return Vec::new();
        }
        self.early_errors
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_run_time_absent_by_default() {
        let cli = Cli::parse_from(["core"]);
        assert!(cli.max_run_time().is_none());
    }

    #[test]
    fn max_run_time_parses_seconds() {
        let cli = Cli::parse_from(["core", "--maxRunTimeSec", "120"]);
        assert_eq!(cli.max_run_time(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn early_errors_split_on_comma() {
        let cli = Cli::parse_from(["core", "--earlyErrors", "/endpoints/a, /endpoints/b"]);
        assert_eq!(cli.early_error_paths(), vec!["/endpoints/a", "/endpoints/b"]);
    }
}
