//! Public server: accept loop and per-connection dispatch.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Read and classify each request head
//! - Hand upgrade requests to the relay with their early payload
//! - Serve everything else through the axum front-end over hyper
//! - Run the backend health monitor
//! - Drain live connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::health::{BackendHealth, HealthMonitor};
use crate::http::frontend::{self, FrontendState};
use crate::http::subscription::Descriptor;
use crate::net::{read_head, ConnectionGuard, ConnectionTracker, Listener, ReadHead, Rewind};
use crate::relay::{handshake::render_error, Relay, RelayError, RelaySettings};

/// Shared per-connection context.
struct Dispatcher {
    relay: Relay,
    frontend: Router,
    max_head_bytes: usize,
    head_timeout: Duration,
}

/// The public-facing server for the relay and its front-end.
pub struct RelayServer {
    config: AppConfig,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    health: Arc<BackendHealth>,
}

impl RelayServer {
    /// Create a server for a listener bound to `public_port`.
    pub fn new(config: AppConfig, public_port: u16) -> Result<Self, url::ParseError> {
        let tracker = ConnectionTracker::new();
        let health = Arc::new(BackendHealth::new());
        let descriptor = Descriptor::from_config(&config, public_port);

        let state = FrontendState {
            domain: Arc::from(config.subscription.domain.as_str()),
            subscription: Arc::from(descriptor.encoded()?),
            health: health.clone(),
            tracker: tracker.clone(),
        };
        let frontend = frontend::router(
            state,
            &config.subscription.path,
            Duration::from_secs(config.timeouts.request_secs),
        );

        let dispatcher = Arc::new(Dispatcher {
            relay: Relay::new(RelaySettings::from_config(&config)),
            frontend,
            max_head_bytes: config.listener.max_head_bytes,
            head_timeout: Duration::from_secs(config.listener.head_timeout_secs),
        });

        Ok(Self {
            config,
            dispatcher,
            tracker,
            health,
        })
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upgrade_path = %self.config.relay.upgrade_path,
            backend = %self.config.backend.address(),
            policy = ?self.config.relay.handshake_policy,
            "Relay server starting"
        );

        if self.config.health.enabled {
            let monitor = HealthMonitor::new(
                self.config.backend.address(),
                self.health.clone(),
                self.config.health.clone(),
            );
            let monitor_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                monitor.run(monitor_shutdown).await;
            });
        }

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            };

            let (stream, peer, permit) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let guard = self.tracker.track();
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.serve(stream, peer, guard).await;
                drop(permit);
            });
        }

        let deadline = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let remaining = self.tracker.drain(deadline).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Drain deadline reached with connections still open");
        }

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

impl Dispatcher {
    async fn serve(&self, mut stream: TcpStream, peer: SocketAddr, guard: ConnectionGuard) {
        let id = guard.id();

        let read = match read_head(&mut stream, self.max_head_bytes, self.head_timeout).await {
            Ok(read) => read,
            Err(e) => {
                tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Dropping connection before request head");
                if let Some(status) = e.status() {
                    let _ = stream.write_all(&render_error(status)).await;
                }
                let _ = stream.shutdown().await;
                return;
            }
        };

        if !self.relay.is_upgrade(&read.head) {
            self.serve_frontend(stream, peer, read).await;
            return;
        }

        let ReadHead {
            head,
            mut buffer,
            head_len,
        } = read;
        let early = buffer.split_off(head_len).freeze();

        tracing::debug!(
            connection_id = %id,
            peer_addr = %peer,
            method = %head.method,
            path = %head.target,
            "Upgrade request"
        );

        match self.relay.handle_upgrade(head, stream, early, id).await {
            Ok(_) => {}
            Err(e @ RelayError::MidStreamIo { .. }) => {
                tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Relay session ended by peer");
            }
            Err(e) => {
                tracing::warn!(connection_id = %id, peer_addr = %peer, error = %e, "Relay session failed");
            }
        }
    }

    /// Replay the head into hyper and serve one request.
    async fn serve_frontend(&self, stream: TcpStream, peer: SocketAddr, read: ReadHead) {
        let io = TokioIo::new(Rewind::new(read.buffer.freeze(), stream));
        let service = TowerToHyperService::new(self.frontend.clone());

        // Keep-alive is off so every request on the port goes through classification.
        if let Err(e) = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(io, service)
            .await
        {
            tracing::debug!(peer_addr = %peer, error = %e, "Front-end connection ended with error");
        }
    }
}
