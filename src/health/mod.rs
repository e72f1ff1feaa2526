//! Backend health subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → TCP connect check against the backend
//!     → state.rs (Unknown / Reachable / Unreachable with thresholds)
//!     → `/health` response, `relay_backend_reachable` gauge
//! ```

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::{BackendHealth, HealthState};
