//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the upgrade relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Public listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Upgrade relay behavior.
    pub relay: RelayConfig,

    /// Loopback backend the relay dials.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Connection descriptor served by the front-end.
    pub subscription: SubscriptionConfig,

    /// Backend process supervision.
    pub supervisor: SupervisorConfig,

    /// Backend reachability probing.
    pub health: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on the request head (request line + headers) in bytes.
    pub max_head_bytes: usize,

    /// Time allowed for a client to deliver its request head.
    pub head_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            max_head_bytes: 16 * 1024,
            head_timeout_secs: 10,
        }
    }
}

/// How the relay completes the upgrade handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandshakePolicy {
    /// Forward the client's request head unmodified; the backend answers it.
    #[default]
    Verbatim,
    /// Answer `101 Switching Protocols` locally and forward raw bytes only.
    Synthesized,
}

/// Upgrade relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// The single path accepted for upgrades.
    pub upgrade_path: String,

    /// Handshake completion policy.
    pub handshake_policy: HandshakePolicy,

    /// Require `GET` and `Upgrade: websocket`. When false any request on
    /// the upgrade path is relayed as raw TCP.
    pub require_websocket: bool,

    /// Header names removed from a verbatim handshake (case-insensitive).
    pub strip_headers: Vec<String>,

    /// Copy buffer size per direction in bytes.
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upgrade_path: "/speed".to_string(),
            handshake_policy: HandshakePolicy::Verbatim,
            require_websocket: true,
            strip_headers: Vec::new(),
            buffer_size: 16 * 1024,
        }
    }
}

/// Loopback backend address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend host (normally loopback).
    pub host: String,

    /// Backend port owned by the supervised process.
    pub port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl BackendConfig {
    /// `host:port` form used for dialing and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Front-end request timeout in seconds.
    pub request_secs: u64,

    /// Grace period after one relay direction ends before the session is torn down.
    pub linger_secs: u64,

    /// Session idle timeout in seconds (0 disables it).
    pub idle_secs: u64,

    /// Deadline for draining connections on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            linger_secs: 5,
            idle_secs: 0,
            shutdown_secs: 10,
        }
    }
}

/// Connection descriptor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Client UUID embedded in the descriptor and the backend config.
    pub uuid: String,

    /// Public domain clients connect to.
    pub domain: String,

    /// Route serving the descriptor, without leading slash.
    pub path: String,

    /// Port advertised to clients. Defaults to 443 with `tls`, otherwise
    /// the bound listener port.
    pub public_port: Option<u16>,

    /// Advertise `security=tls`.
    pub tls: bool,

    /// Fragment label shown by client apps.
    pub remark: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            uuid: "9afd1229-b893-40c1-84dd-51e7ce204913".to_string(),
            domain: "localhost".to_string(),
            path: "sub".to_string(),
            public_port: None,
            tls: true,
            remark: "upgrade-relay".to_string(),
        }
    }
}

/// Backend process supervision.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Spawn and babysit the backend process.
    pub enabled: bool,

    /// Executable path.
    pub command: Option<String>,

    /// Arguments; `{config}` is replaced by `config_path`.
    pub args: Vec<String>,

    /// Where the rendered backend JSON config is written before each spawn.
    pub config_path: Option<String>,

    /// Base delay for exponential restart backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum restart delay in milliseconds.
    pub max_delay_ms: u64,

    /// A run at least this long resets the backoff.
    pub stable_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            args: vec!["-c".to_string(), "{config}".to_string()],
            config_path: None,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            stable_secs: 30,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active backend checks.
    pub enabled: bool,

    /// Check interval in seconds.
    pub interval_secs: u64,

    /// Check connect timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unreachable.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking reachable.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            unhealthy_threshold: 3,
            healthy_threshold: 1,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
