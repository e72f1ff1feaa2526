//! Public HTTP surface.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (read head, classify)
//!     → upgrade? → relay session
//!     → otherwise frontend.rs over hyper
//!         → request.rs (request id)
//!         → subscription.rs (connection descriptor)
//! ```

pub mod frontend;
pub mod request;
pub mod server;
pub mod subscription;

pub use frontend::{FrontendState, HealthReport};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::RelayServer;
pub use subscription::Descriptor;
