//! Backend process supervision.
//!
//! # Data Flow
//! ```text
//! provision.rs (render backend JSON config, write to disk)
//!     → process.rs (spawn, wait, restart)
//!     → backoff.rs (delay between restarts)
//! ```

pub mod backoff;
pub mod process;
pub mod provision;

pub use process::{Supervisor, SupervisorError};
pub use provision::render_backend_config;
