//! Backend process supervision.
//!
//! # Responsibilities
//! - Provision the backend config before every spawn
//! - Spawn the backend with `{config}` substituted into its arguments
//! - Restart it with exponential backoff when it exits or fails to spawn
//! - Kill it on shutdown
//!
//! The relay does not wait for the backend. Sessions opened while it is
//! down fail their dial with 502 like any other unreachable backend.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use crate::config::{AppConfig, SupervisorConfig};
use crate::observability::metrics;
use crate::supervisor::backoff::calculate_backoff;
use crate::supervisor::provision::write_backend_config;

const CONFIG_PLACEHOLDER: &str = "{config}";

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor enabled without a command")]
    MissingCommand,
}

/// Keeps one backend process alive.
pub struct Supervisor {
    app: AppConfig,
    command: String,
    config_path: Option<PathBuf>,
}

impl Supervisor {
    pub fn new(app: AppConfig) -> Result<Self, SupervisorError> {
        let command = app
            .supervisor
            .command
            .clone()
            .ok_or(SupervisorError::MissingCommand)?;
        let config_path = app.supervisor.config_path.as_ref().map(PathBuf::from);
        Ok(Self {
            app,
            command,
            config_path,
        })
    }

    fn settings(&self) -> &SupervisorConfig {
        &self.app.supervisor
    }

    /// Arguments with the config placeholder substituted.
    pub fn args(&self) -> Vec<String> {
        let path = self
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        self.settings()
            .args
            .iter()
            .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &path))
            .collect()
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let stable = Duration::from_secs(self.settings().stable_secs);
        let mut attempt: u32 = 0;

        tracing::info!(command = %self.command, "Backend supervisor starting");

        loop {
            if attempt > 0 {
                let delay = calculate_backoff(
                    attempt,
                    self.settings().base_delay_ms,
                    self.settings().max_delay_ms,
                );
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Restarting backend after delay");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => break,
                }
                metrics::record_backend_restart();
            }

            let mut child = match self.spawn().await {
                Ok(child) => child,
                Err(e) => {
                    tracing::error!(command = %self.command, error = %e, "Failed to start backend");
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            let started = Instant::now();
            tracing::info!(pid = child.id(), "Backend started");

            tokio::select! {
                status = child.wait() => {
                    log_exit(status, started.elapsed());
                    attempt = if started.elapsed() >= stable { 1 } else { attempt.saturating_add(1) };
                }
                _ = shutdown.recv() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill backend");
                    }
                    break;
                }
            }
        }

        tracing::info!("Backend supervisor stopped");
    }

    async fn spawn(&self) -> std::io::Result<Child> {
        if let Some(path) = &self.config_path {
            write_backend_config(&self.app, path).await?;
            tracing::debug!(path = %path.display(), "Backend config written");
        }

        Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

fn log_exit(status: std::io::Result<ExitStatus>, ran_for: Duration) {
    match status {
        Ok(status) => tracing::warn!(
            status = %status,
            ran_for_ms = ran_for.as_millis() as u64,
            "Backend exited"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to wait for backend"),
    }
}
