//! Prometheus metrics endpoint.

use crate::server::OrbitRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<OrbitRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &OrbitRelay) -> String {
    let m = relay.metrics();

    // Gauges
    let connections = relay.active_connections();
    let devices = relay.directory().len();
    let accounts = relay.registry().account_count();
    let listed = relay.registry().device_count();
    let buckets = relay.limiter().bucket_count();

    // Counters
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let registrations = m.registrations_total.load(Ordering::Relaxed);
    let forwarded = m.control_forwarded_total.load(Ordering::Relaxed);
    let offline = m.target_offline_total.load(Ordering::Relaxed);
    let malformed = m.malformed_total.load(Ordering::Relaxed);
    let unknown = m.unknown_total.load(Ordering::Relaxed);
    let frames = m.frames_forwarded_total.load(Ordering::Relaxed);
    let bytes = m.bytes_relayed.load(Ordering::Relaxed);
    let dropped = m.frames_dropped_total.load(Ordering::Relaxed);
    let throttled = m.frames_throttled_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP orbit_relay_connections_active Open transfer connections
# TYPE orbit_relay_connections_active gauge
orbit_relay_connections_active {connections}

# HELP orbit_relay_devices_routable Devices reachable by id
# TYPE orbit_relay_devices_routable gauge
orbit_relay_devices_routable {devices}

# HELP orbit_relay_accounts_online Accounts with at least one listed device
# TYPE orbit_relay_accounts_online gauge
orbit_relay_accounts_online {accounts}

# HELP orbit_relay_devices_listed Devices listed in presence sets
# TYPE orbit_relay_devices_listed gauge
orbit_relay_devices_listed {listed}

# HELP orbit_relay_rate_buckets Live per-account bandwidth buckets
# TYPE orbit_relay_rate_buckets gauge
orbit_relay_rate_buckets {buckets}

# HELP orbit_relay_info Server information
# TYPE orbit_relay_info gauge
orbit_relay_info{{version="{version}"}} 1

# HELP orbit_relay_connections_total Total connections accepted
# TYPE orbit_relay_connections_total counter
orbit_relay_connections_total {conns_total}

# HELP orbit_relay_registrations_total Total REGISTER messages handled
# TYPE orbit_relay_registrations_total counter
orbit_relay_registrations_total {registrations}

# HELP orbit_relay_control_forwarded_total Total handshake messages forwarded
# TYPE orbit_relay_control_forwarded_total counter
orbit_relay_control_forwarded_total {forwarded}

# HELP orbit_relay_target_offline_total Total handshake messages to offline targets
# TYPE orbit_relay_target_offline_total counter
orbit_relay_target_offline_total {offline}

# HELP orbit_relay_malformed_total Total malformed control messages
# TYPE orbit_relay_malformed_total counter
orbit_relay_malformed_total {malformed}

# HELP orbit_relay_unknown_total Total control messages of unknown type
# TYPE orbit_relay_unknown_total counter
orbit_relay_unknown_total {unknown}

# HELP orbit_relay_frames_forwarded_total Total binary frames forwarded
# TYPE orbit_relay_frames_forwarded_total counter
orbit_relay_frames_forwarded_total {frames}

# HELP orbit_relay_bytes_relayed_total Total payload bytes forwarded
# TYPE orbit_relay_bytes_relayed_total counter
orbit_relay_bytes_relayed_total {bytes}

# HELP orbit_relay_frames_dropped_total Total binary frames dropped
# TYPE orbit_relay_frames_dropped_total counter
orbit_relay_frames_dropped_total {dropped}

# HELP orbit_relay_frames_throttled_total Total binary frames metered by a rate bucket
# TYPE orbit_relay_frames_throttled_total counter
orbit_relay_frames_throttled_total {throttled}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
