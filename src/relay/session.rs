//! One upgrade session: validate, dial, handshake, pipe.
//!
//! # State Machine
//! ```text
//! Connecting ──dial ok──▶ Handshaking ──handshake sent──▶ Piping ──either side done──▶ Closed
//!      │                        │
//!      └── reject / 502 ────────┴──────────────────────────────────────────────────▶ Closed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{AppConfig, HandshakePolicy};
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::relay::error::RelayError;
use crate::relay::handshake::{
    accept_key, render_error, render_handshake, render_switching_protocols, RequestHead,
};
use crate::relay::pipe::{pipe, PipeOptions, PipeStats};

/// Read-only settings shared by every session.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub upgrade_path: String,
    pub backend_addr: String,
    pub policy: HandshakePolicy,
    pub require_websocket: bool,
    pub strip_headers: Vec<String>,
    pub connect_timeout: Duration,
    pub pipe: PipeOptions,
}

impl RelaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let idle = config.timeouts.idle_secs;
        Self {
            upgrade_path: config.relay.upgrade_path.clone(),
            backend_addr: config.backend.address(),
            policy: config.relay.handshake_policy,
            require_websocket: config.relay.require_websocket,
            strip_headers: config.relay.strip_headers.clone(),
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            pipe: PipeOptions {
                buffer_size: config.relay.buffer_size,
                linger: Duration::from_secs(config.timeouts.linger_secs),
                idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
            },
        }
    }
}

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Handshaking,
    Piping,
    Closed,
}

/// Outcome of a session that reached piping.
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub stats: PipeStats,
    /// Payload bytes that arrived with the handshake.
    pub early_bytes: usize,
    pub duration: Duration,
}

/// Per-session bookkeeping for logging.
struct RelaySession {
    id: ConnectionId,
    state: SessionState,
    started: Instant,
}

impl RelaySession {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            connection_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
    }
}

/// Bridges public upgrade requests to the loopback backend.
#[derive(Debug, Clone)]
pub struct Relay {
    settings: Arc<RelaySettings>,
}

impl Relay {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Whether a request belongs to the relay rather than the front-end.
    pub fn is_upgrade(&self, head: &RequestHead) -> bool {
        head.header("upgrade").is_some()
            || (!self.settings.require_websocket && head.path() == self.settings.upgrade_path)
    }

    /// Check a request against the configured route and handshake policy.
    ///
    /// Returns the `Sec-WebSocket-Accept` value when the relay will answer
    /// the handshake itself.
    pub fn validate(&self, head: &RequestHead) -> Result<Option<String>, RelayError> {
        let settings = &self.settings;

        let method_ok = !settings.require_websocket || head.method == "GET";
        if head.path() != settings.upgrade_path || !method_ok {
            return Err(RelayError::PathRejected {
                method: head.method.clone(),
                path: head.path().to_string(),
            });
        }

        if settings.require_websocket {
            let upgrade = head.header_str("upgrade").unwrap_or_default();
            if !upgrade.trim().eq_ignore_ascii_case("websocket") {
                return Err(RelayError::HandshakeMalformed("Upgrade header is not websocket"));
            }
            if !head.header_has_token("connection", "upgrade") {
                return Err(RelayError::HandshakeMalformed("Connection header lacks upgrade"));
            }
        }

        match settings.policy {
            HandshakePolicy::Verbatim => Ok(None),
            HandshakePolicy::Synthesized => {
                let key = head
                    .header_str("sec-websocket-key")
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or(RelayError::HandshakeMalformed("missing Sec-WebSocket-Key"))?;
                Ok(Some(accept_key(key)))
            }
        }
    }

    /// Relay one upgrade request until both directions are finished.
    ///
    /// `early` holds bytes that arrived behind the request head; they are
    /// delivered to the backend before piping starts. On every error path the
    /// client gets a status response when the handshake has not completed,
    /// and the connection is closed.
    pub async fn handle_upgrade<S>(
        &self,
        head: RequestHead,
        mut client: S,
        early: Bytes,
        id: ConnectionId,
    ) -> Result<SessionSummary, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = RelaySession::new(id);
        let _active = metrics::ActiveSession::start();

        let result = self.run(&mut session, &head, &mut client, early).await;
        session.transition(SessionState::Closed);

        match &result {
            Ok(summary) => {
                metrics::record_bytes(summary.stats.client_to_backend, summary.stats.backend_to_client);
                metrics::record_session(summary.stats.end.as_str(), session.started);
                tracing::info!(
                    connection_id = %id,
                    path = %head.target,
                    end = summary.stats.end.as_str(),
                    clean = summary.stats.clean,
                    bytes_up = summary.stats.client_to_backend,
                    bytes_down = summary.stats.backend_to_client,
                    duration_ms = summary.duration.as_millis() as u64,
                    "Relay session closed"
                );
            }
            Err(e) => {
                if let RelayError::MidStreamIo { client_to_backend, backend_to_client, .. } = e {
                    metrics::record_bytes(*client_to_backend, *backend_to_client);
                }
                metrics::record_session(e.outcome(), session.started);
            }
        }
        result
    }

    async fn run<S>(
        &self,
        session: &mut RelaySession,
        head: &RequestHead,
        client: &mut S,
        early: Bytes,
    ) -> Result<SessionSummary, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let accept = match self.validate(head) {
            Ok(accept) => accept,
            Err(e) => return Err(reject(client, e).await),
        };

        let mut backend = match self.dial().await {
            Ok(stream) => stream,
            Err(e) => return Err(reject(client, e).await),
        };

        session.transition(SessionState::Handshaking);
        match accept {
            None => {
                let strip = &self.settings.strip_headers;
                let handshake = if strip.is_empty() {
                    [head.as_bytes(), &early[..]].concat()
                } else {
                    render_handshake(&head.request_line(), &head.headers_without(strip), &early)
                };
                if let Err(source) = backend.write_all(&handshake).await {
                    let err = RelayError::BackendUnreachable {
                        addr: self.settings.backend_addr.clone(),
                        source,
                    };
                    return Err(reject(client, err).await);
                }
            }
            Some(accept) => {
                if let Err(source) = client.write_all(&render_switching_protocols(&accept)).await {
                    return Err(RelayError::MidStreamIo {
                        source,
                        client_to_backend: 0,
                        backend_to_client: 0,
                    });
                }
                // The client already has its 101; from here on failures just close.
                if !early.is_empty() {
                    if let Err(source) = backend.write_all(&early).await {
                        let _ = client.shutdown().await;
                        return Err(RelayError::BackendUnreachable {
                            addr: self.settings.backend_addr.clone(),
                            source,
                        });
                    }
                }
            }
        }

        session.transition(SessionState::Piping);
        tracing::info!(
            connection_id = %session.id,
            backend = %self.settings.backend_addr,
            policy = ?self.settings.policy,
            early_bytes = early.len(),
            "Relay session established"
        );

        let stats = pipe(client, backend, &self.settings.pipe).await?;
        Ok(SessionSummary {
            stats,
            early_bytes: early.len(),
            duration: session.started.elapsed(),
        })
    }

    /// Open a fresh backend connection, bounded by the connect timeout.
    async fn dial(&self) -> Result<TcpStream, RelayError> {
        let addr = &self.settings.backend_addr;
        let start = Instant::now();

        let result = match tokio::time::timeout(self.settings.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(source),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.settings.connect_timeout),
            )),
        };
        metrics::record_dial(result.is_ok(), start);

        let stream = result.map_err(|source| RelayError::BackendUnreachable {
            addr: addr.clone(),
            source,
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend socket");
        }
        Ok(stream)
    }
}

/// Answer the client with the error's status (if any) and close it.
async fn reject<S>(client: &mut S, err: RelayError) -> RelayError
where
    S: AsyncWrite + Unpin,
{
    if let Some(status) = err.status() {
        let _ = client.write_all(&render_error(status)).await;
    }
    let _ = client.shutdown().await;
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn settings(policy: HandshakePolicy, require_websocket: bool) -> RelaySettings {
        RelaySettings {
            upgrade_path: "/speed".into(),
            backend_addr: "127.0.0.1:9".into(),
            policy,
            require_websocket,
            strip_headers: Vec::new(),
            connect_timeout: Duration::from_millis(500),
            pipe: PipeOptions::default(),
        }
    }

    fn head(raw: &str) -> RequestHead {
        RequestHead::parse(raw.as_bytes()).unwrap().unwrap().0
    }

    const WS: &str = "GET /speed HTTP/1.1\r\nHost: a\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    #[test]
    fn classification_depends_on_mode() {
        let ws = Relay::new(settings(HandshakePolicy::Verbatim, true));
        let raw = Relay::new(settings(HandshakePolicy::Verbatim, false));
        let plain = head("GET /speed HTTP/1.1\r\nHost: a\r\n\r\n");
        let other_upgrade = head("GET /elsewhere HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");

        assert!(ws.is_upgrade(&head(WS)));
        assert!(!ws.is_upgrade(&plain));
        assert!(raw.is_upgrade(&plain));
        // Upgrades on other paths still reach the relay so they get rejected there.
        assert!(ws.is_upgrade(&other_upgrade));
    }

    #[test]
    fn validate_websocket_rules() {
        let relay = Relay::new(settings(HandshakePolicy::Verbatim, true));
        assert_eq!(relay.validate(&head(WS)).unwrap(), None);

        let wrong_path = head("GET /other HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        assert!(matches!(relay.validate(&wrong_path), Err(RelayError::PathRejected { .. })));

        let wrong_method = head("POST /speed HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        assert!(matches!(relay.validate(&wrong_method), Err(RelayError::PathRejected { .. })));

        let not_ws = head("GET /speed HTTP/1.1\r\nUpgrade: h2c\r\n\r\n");
        assert!(matches!(relay.validate(&not_ws), Err(RelayError::HandshakeMalformed(_))));

        let no_connection = head("GET /speed HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        assert!(matches!(relay.validate(&no_connection), Err(RelayError::HandshakeMalformed(_))));
    }

    #[test]
    fn raw_mode_skips_header_checks() {
        let relay = Relay::new(settings(HandshakePolicy::Verbatim, false));
        let post = head("POST /speed?x=1 HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(relay.validate(&post).unwrap(), None);
    }

    #[test]
    fn synthesized_needs_key() {
        let relay = Relay::new(settings(HandshakePolicy::Synthesized, true));
        assert_eq!(
            relay.validate(&head(WS)).unwrap().as_deref(),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );

        let keyless = head("GET /speed HTTP/1.1\r\nUpgrade: websocket\r\nConnection: upgrade\r\n\r\n");
        assert!(matches!(relay.validate(&keyless), Err(RelayError::HandshakeMalformed(_))));
    }

    #[tokio::test]
    async fn rejected_path_answers_404_without_dialing() {
        let relay = Relay::new(settings(HandshakePolicy::Verbatim, true));
        let (client, mut peer) = tokio::io::duplex(1024);

        let request = head("GET /nope HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        let err = relay
            .handle_upgrade(request, client, Bytes::new(), ConnectionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PathRejected { .. }));

        let mut response = String::new();
        peer.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn unreachable_backend_answers_502() {
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let relay = Relay::new(RelaySettings {
            backend_addr: addr.to_string(),
            ..settings(HandshakePolicy::Verbatim, true)
        });
        let (client, mut peer) = tokio::io::duplex(1024);

        let err = relay
            .handle_upgrade(head(WS), client, Bytes::new(), ConnectionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BackendUnreachable { .. }));

        let mut response = String::new();
        peer.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    }

    #[tokio::test]
    async fn dial_gives_up_at_connect_timeout() {
        // TEST-NET-1 is never routed; the connect either hangs until the
        // timeout or fails at once on hosts without a route.
        let relay = Relay::new(RelaySettings {
            backend_addr: "192.0.2.1:8001".into(),
            connect_timeout: Duration::from_millis(200),
            ..settings(HandshakePolicy::Verbatim, true)
        });
        let (client, mut peer) = tokio::io::duplex(1024);

        let started = Instant::now();
        let err = relay
            .handle_upgrade(head(WS), client, Bytes::new(), ConnectionId::new())
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));

        match &err {
            RelayError::BackendUnreachable { source, .. } if source.kind() == std::io::ErrorKind::TimedOut => {
                assert!(started.elapsed() >= Duration::from_millis(200));
                assert!(source.to_string().contains("timed out"));
            }
            RelayError::BackendUnreachable { .. } => {}
            other => panic!("unexpected error: {other}"),
        }

        let mut response = String::new();
        peer.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    }
}
