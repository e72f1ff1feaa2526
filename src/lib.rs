//! Upgrade relay library.
//!
//! Bridges one public port to a loopback backend: HTTP Upgrade (WebSocket)
//! requests on the configured path are relayed to the backend byte for byte,
//! everything else is served by a small HTTP front-end.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod supervisor;

pub use config::schema::AppConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use relay::{render_handshake, Relay, RelayError};
