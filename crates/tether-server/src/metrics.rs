//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before anything records a metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Used by tests and by callers that render their own metrics.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names shared across the server.

/// Relay sockets accepted (counter).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Relay sockets closed (counter, labels: reason).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Live relay sockets (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Relay socket lifetime in seconds (histogram).
pub const RELAY_CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
/// Frames dropped on full outbound queues (counter).
pub const RELAY_SEND_DROPS_TOTAL: &str = "relay_send_drops_total";
/// Notify requests handled (counter, labels: kind).
pub const GATEWAY_EVENTS_TOTAL: &str = "gateway_events_total";
/// Notify requests that failed (counter, labels: kind, code).
pub const GATEWAY_ERRORS_TOTAL: &str = "gateway_errors_total";
/// Identities a notify request reached (counter, labels: kind).
pub const GATEWAY_DELIVERED_TOTAL: &str = "gateway_delivered_total";
/// Notify handling time in seconds (histogram, labels: kind).
pub const GATEWAY_DURATION_SECONDS: &str = "gateway_duration_seconds";
/// Media grants issued (counter).
pub const TOKENS_ISSUED_TOTAL: &str = "tokens_issued_total";
/// Media grant requests rejected (counter, labels: reason).
pub const TOKEN_ERRORS_TOTAL: &str = "token_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_renders() {
        let handle = detached_handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            RELAY_CONNECTIONS_TOTAL,
            RELAY_DISCONNECTIONS_TOTAL,
            RELAY_CONNECTIONS_ACTIVE,
            RELAY_CONNECTION_DURATION_SECONDS,
            RELAY_SEND_DROPS_TOTAL,
            GATEWAY_EVENTS_TOTAL,
            GATEWAY_ERRORS_TOTAL,
            GATEWAY_DELIVERED_TOTAL,
            GATEWAY_DURATION_SECONDS,
            TOKENS_ISSUED_TOTAL,
            TOKEN_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name not snake_case: {name}"
            );
        }
    }
}
