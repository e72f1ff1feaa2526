//! Command-line and environment overrides.
//!
//! Platform deployments configure the relay almost entirely through
//! environment variables (`PORT`, `UUID`, ...). The binary collects them with
//! clap and applies them on top of the file configuration. The platform's
//! `RAILWAY_STATIC_URL` stands in for the domain when none is given.

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// Values that replace file configuration when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub uuid: Option<String>,
    pub domain: Option<String>,
    pub sub_path: Option<String>,
    pub backend_port: Option<u16>,
    pub upgrade_path: Option<String>,
}

impl Overrides {
    /// Use `fallback` as the domain when none was given explicitly.
    pub fn with_domain_fallback(mut self, fallback: Option<String>) -> Self {
        if self.domain.is_none() {
            self.domain = fallback.filter(|d| !d.trim().is_empty());
        }
        self
    }

    /// Apply every present override to `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{}", port),
            };
        }
        if let Some(uuid) = &self.uuid {
            config.subscription.uuid = uuid.clone();
        }
        if let Some(domain) = &self.domain {
            config.subscription.domain = domain.clone();
        }
        if let Some(path) = &self.sub_path {
            config.subscription.path = path.trim_start_matches('/').to_string();
        }
        if let Some(port) = self.backend_port {
            config.backend.port = port;
        }
        if let Some(path) = &self.upgrade_path {
            config.relay.upgrade_path = if path.starts_with('/') {
                path.clone()
            } else {
                format!("/{}", path)
            };
        }
    }
}
