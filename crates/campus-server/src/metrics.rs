//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before anything is recorded; a second call fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket upgrades accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Upgrades refused at the connection cap (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Sessions torn down (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Activated WebSocket sessions; handshakes in progress are not counted (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Handshakes that ended in a close frame (counter, labels: code).
pub const WS_HANDSHAKE_FAILURES_TOTAL: &str = "ws_handshake_failures_total";
/// Session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed for falling behind (counter).
pub const WS_SLOW_CLIENT_EVICTIONS_TOTAL: &str = "ws_slow_client_evictions_total";
/// Frames enqueued by the dispatcher (counter, labels: target).
pub const HUB_MESSAGES_DELIVERED_TOTAL: &str = "hub_messages_delivered_total";
/// Frames dropped on a full outbound queue (counter).
pub const HUB_MESSAGES_DROPPED_TOTAL: &str = "hub_messages_dropped_total";
/// `POST /publish` calls (counter, labels: status).
pub const HUB_PUBLISH_REQUESTS_TOTAL: &str = "hub_publish_requests_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(HUB_MESSAGES_DELIVERED_TOTAL, "target" => "tenant").increment(3);
        });

        let text = render(&handle);
        assert!(text.contains("hub_messages_delivered_total"));
        assert!(text.contains("target=\"tenant\""));
    }

    #[test]
    fn empty_recorder_renders_nothing_for_our_names() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let text = render(&handle);
        assert!(!text.contains(WS_CONNECTIONS_TOTAL));
    }

    #[test]
    fn names_are_unique() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_REJECTED_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_HANDSHAKE_FAILURES_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            WS_SLOW_CLIENT_EVICTIONS_TOTAL,
            HUB_MESSAGES_DELIVERED_TOTAL,
            HUB_MESSAGES_DROPPED_TOTAL,
            HUB_PUBLISH_REQUESTS_TOTAL,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
