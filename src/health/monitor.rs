//! Active backend probing.
//!
//! # Responsibilities
//! - Periodically TCP-connect to the backend
//! - Update the shared reachability state
//!
//! The relay never consults this state; every session dials on its own.
//! It only feeds `/health` and the reachability gauge.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::{BackendHealth, HealthState};
use crate::observability::metrics;

pub struct HealthMonitor {
    addr: String,
    health: Arc<BackendHealth>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(addr: String, health: Arc<BackendHealth>, config: HealthCheckConfig) -> Self {
        Self { addr, health, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Backend health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            backend = %self.addr,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check once and record the result.
    pub async fn check(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let reachable = match time::timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!(backend = %self.addr, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(backend = %self.addr, "Health check failed: timeout");
                false
            }
        };

        let changed = if reachable {
            self.health.mark_success(self.config.healthy_threshold as usize)
        } else {
            self.health.mark_failure(self.config.unhealthy_threshold as usize)
        };

        if changed {
            let state = self.health.state();
            if reachable {
                tracing::info!(backend = %self.addr, state = state.as_str(), "Backend state changed");
            } else {
                tracing::warn!(backend = %self.addr, state = state.as_str(), "Backend state changed");
            }
        }

        metrics::record_backend_reachable(self.health.state() == HealthState::Reachable);
    }
}
