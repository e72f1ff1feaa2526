//! Upgrade relay binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 UPGRADE RELAY                │
//!     Client              │  ┌──────────┐   ┌────────┐   ┌───────────┐   │
//!     ────────────────────┼─▶│ listener │──▶│  head  │──▶│  relay    │───┼──▶ Backend
//!                         │  └──────────┘   └───┬────┘   │ session   │   │   (loopback)
//!                         │                     │        └───────────┘   │
//!                         │                     ▼                        │
//!                         │              ┌─────────────┐                 │
//!                         │              │  front-end  │ /, /health,     │
//!                         │              │  (axum)     │ /<sub path>     │
//!                         │              └─────────────┘                 │
//!                         │                                              │
//!                         │  supervisor ─ spawns and restarts backend    │
//!                         │  health     ─ checks backend reachability    │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use upgrade_relay::config::{self, AppConfig, Overrides};
use upgrade_relay::lifecycle::{wait_for_signal, Shutdown};
use upgrade_relay::net::Listener;
use upgrade_relay::observability::{logging, metrics};
use upgrade_relay::supervisor::Supervisor;
use upgrade_relay::RelayServer;

#[derive(Parser)]
#[command(name = "upgrade-relay")]
#[command(about = "Relay HTTP Upgrade traffic from a public port to a loopback backend", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Public listen port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Client UUID advertised in the subscription.
    #[arg(long, env = "UUID")]
    uuid: Option<String>,

    /// Public domain advertised in the subscription (falls back to `RAILWAY_STATIC_URL`).
    #[arg(long, env = "DOMAIN")]
    domain: Option<String>,

    /// Subscription route, without leading slash.
    #[arg(long, env = "SUB_PATH")]
    sub_path: Option<String>,

    /// Loopback backend port.
    #[arg(long, env = "BACKEND_PORT")]
    backend_port: Option<u16>,

    /// Path that is relayed to the backend.
    #[arg(long, env = "UPGRADE_PATH")]
    upgrade_path: Option<String>,
}

/// Domain variable set by the hosting platform.
const PLATFORM_DOMAIN_ENV: &str = "RAILWAY_STATIC_URL";

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            uuid: self.uuid.clone(),
            domain: self.domain.clone(),
            sub_path: self.sub_path.clone(),
            backend_port: self.backend_port,
            upgrade_path: self.upgrade_path.clone(),
        }
        .with_domain_fallback(std::env::var(PLATFORM_DOMAIN_ENV).ok())
    }
}

fn load(cli: &Cli) -> Result<AppConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };
    cli.overrides().apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_logging(&config.observability);
    tracing::info!("upgrade-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upgrade_path = %config.relay.upgrade_path,
        backend = %config.backend.address(),
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let port = listener.local_addr()?.port();

    let shutdown = Shutdown::new();

    if config.supervisor.enabled {
        let supervisor = Supervisor::new(config.clone())?;
        tokio::spawn(supervisor.run(shutdown.subscribe()));
    }

    let server = RelayServer::new(config, port)?;
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
