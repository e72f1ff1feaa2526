//! Connection descriptor served to client apps.
//!
//! The descriptor is a `vless://` share link pointing clients at the relay's
//! public port and upgrade path. The front-end serves it base64-encoded,
//! which is the subscription format client apps import.

use base64::Engine as _;
use url::Url;

use crate::config::AppConfig;

/// Port clients reach when TLS is terminated in front of the relay.
pub const TLS_PORT: u16 = 443;

/// Everything a client needs to reach the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: String,
    pub domain: String,
    pub port: u16,
    pub upgrade_path: String,
    pub tls: bool,
    pub remark: String,
}

impl Descriptor {
    /// Build from configuration. `bound_port` is the public listener port,
    /// advertised only for plain links without an explicit public port.
    pub fn from_config(config: &AppConfig, bound_port: u16) -> Self {
        let sub = &config.subscription;
        let default_port = if sub.tls { TLS_PORT } else { bound_port };
        Self {
            uuid: sub.uuid.clone(),
            domain: sub.domain.clone(),
            port: sub.public_port.unwrap_or(default_port),
            upgrade_path: config.relay.upgrade_path.clone(),
            tls: sub.tls,
            remark: sub.remark.clone(),
        }
    }

    /// The share link.
    pub fn link(&self) -> Result<String, url::ParseError> {
        let mut url = Url::parse(&format!("vless://{}@{}:{}", self.uuid, self.domain, self.port))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("encryption", "none");
            if self.tls {
                query.append_pair("security", "tls");
                query.append_pair("sni", &self.domain);
            } else {
                query.append_pair("security", "none");
            }
            query.append_pair("type", "ws");
            query.append_pair("path", &self.upgrade_path);
        }
        url.set_fragment(Some(&self.remark));
        Ok(url.into())
    }

    /// Subscription body: the link, base64-encoded.
    pub fn encoded(&self) -> Result<String, url::ParseError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.link()?))
    }
}
