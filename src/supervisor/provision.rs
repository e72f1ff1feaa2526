//! Backend configuration rendering.
//!
//! The backend is a VLESS-over-WebSocket proxy listening on loopback. Its
//! JSON config is derived from the relay's own settings so the two can never
//! disagree about port, path or client id.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::AppConfig;

/// Render the backend's JSON configuration.
pub fn render_backend_config(config: &AppConfig) -> Value {
    json!({
        "log": { "loglevel": "warning" },
        "inbounds": [{
            "listen": config.backend.host,
            "port": config.backend.port,
            "protocol": "vless",
            "settings": {
                "clients": [{ "id": config.subscription.uuid, "level": 0 }],
                "decryption": "none"
            },
            "streamSettings": {
                "network": "ws",
                "wsSettings": { "path": config.relay.upgrade_path }
            }
        }],
        "outbounds": [{ "protocol": "freedom" }]
    })
}

/// Write the rendered configuration to `path`, creating parent directories.
pub async fn write_backend_config(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let rendered = serde_json::to_vec_pretty(&render_backend_config(config))?;
    tokio::fs::write(path, rendered).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_matches_relay_settings() {
        let mut config = AppConfig::default();
        config.backend.port = 9100;
        config.relay.upgrade_path = "/tunnel".into();

        let value = render_backend_config(&config);
        let inbound = &value["inbounds"][0];
        assert_eq!(inbound["listen"], "127.0.0.1");
        assert_eq!(inbound["port"], 9100);
        assert_eq!(inbound["protocol"], "vless");
        assert_eq!(inbound["settings"]["clients"][0]["id"], config.subscription.uuid.as_str());
        assert_eq!(inbound["settings"]["decryption"], "none");
        assert_eq!(inbound["streamSettings"]["network"], "ws");
        assert_eq!(inbound["streamSettings"]["wsSettings"]["path"], "/tunnel");
        assert_eq!(value["outbounds"][0]["protocol"], "freedom");
        assert_eq!(value["log"]["loglevel"], "warning");
    }

    #[tokio::test]
    async fn writes_pretty_json() {
        let dir = std::env::temp_dir().join(format!("upgrade-relay-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");

        write_backend_config(&AppConfig::default(), &path).await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["inbounds"][0]["port"], 8001);
        assert!(text.contains('\n'));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
