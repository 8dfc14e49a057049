//! Tracing subscriber setup: a pretty/JSON format split and a
//! `RUST_LOG`-overridable default filter.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log output format (§6: `--logger` accepts `auto`, `syslog`, `stderr`,
/// `platform`; this crate only distinguishes human vs. structured since
/// a syslog/platform sink is an ambient-OS detail out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output, for running `fleetd` interactively.
    Human,
    /// Structured JSON output, for supervised/production deployment.
    Json,
}

/// Initializes the global tracing subscriber. Call once at startup.
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleet=info,warn"));

    match format {
        LogFormat::Human => {
            let subscriber = fmt::layer().with_target(false).with_thread_ids(false).compact();
            tracing_subscriber::registry().with(env_filter).with(subscriber).init();
        }
        LogFormat::Json => {
            let subscriber = fmt::layer().json().with_target(true);
            tracing_subscriber::registry().with(env_filter).with(subscriber).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_equality() {
        assert_eq!(LogFormat::Human, LogFormat::Human);
        assert_eq!(LogFormat::Json, LogFormat::Json);
        assert_ne!(LogFormat::Human, LogFormat::Json);
    }
}
