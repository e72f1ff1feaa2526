//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_sessions_total` (counter): finished upgrade sessions by outcome
//! - `relay_active_sessions` (gauge): sessions currently relaying
//! - `relay_bytes_total` (counter): bytes piped, by direction
//! - `relay_dial_duration_seconds` (histogram): backend connect latency
//! - `relay_backend_reachable` (gauge): 1=reachable, 0=unreachable
//! - `relay_backend_restarts_total` (counter): supervised process restarts
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished relay session.
pub fn record_session(outcome: &'static str, start: Instant) {
    metrics::counter!("relay_sessions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("relay_session_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record piped bytes for one session.
pub fn record_bytes(client_to_backend: u64, backend_to_client: u64) {
    metrics::counter!("relay_bytes_total", "direction" => "upstream").increment(client_to_backend);
    metrics::counter!("relay_bytes_total", "direction" => "downstream").increment(backend_to_client);
}

/// Record a backend dial attempt.
pub fn record_dial(success: bool, start: Instant) {
    let result = if success { "ok" } else { "error" };
    metrics::histogram!("relay_dial_duration_seconds", "result" => result)
        .record(start.elapsed().as_secs_f64());
}

/// Gauge guard for a live session; decrements on drop.
pub struct ActiveSession(());

impl ActiveSession {
    pub fn start() -> Self {
        metrics::gauge!("relay_active_sessions").increment(1.0);
        Self(())
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        metrics::gauge!("relay_active_sessions").decrement(1.0);
    }
}

/// Record the backend reachability state.
pub fn record_backend_reachable(reachable: bool) {
    metrics::gauge!("relay_backend_reachable").set(if reachable { 1.0 } else { 0.0 });
}

/// Record a supervised backend restart.
pub fn record_backend_restart() {
    metrics::counter!("relay_backend_restarts_total").increment(1);
}
