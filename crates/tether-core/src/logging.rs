//! Tracing subscriber bootstrap.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to
//! every tether crate and `warn` to dependencies.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Output format for log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, ANSI colored.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Build the filter directive used when `RUST_LOG` is unset.
pub fn default_directive(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error") => l.to_owned(),
        _ => "info".to_owned(),
    };
    format!(
        "warn,tether={level},tether_core={level},tether_server={level},tether_client={level},tower_http={level}"
    )
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .try_init(),
    };
    if result.is_ok() {
        tracing::debug!(?format, "tracing subscriber installed");
    }
}
