//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection id, live-connection tracking)
//!     → head.rs (read request head, keep early payload)
//!     → upgrade? → relay
//!     → otherwise rewind.rs replays the head into the HTTP front-end
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One public port serves both the relay and the front-end

pub mod connection;
pub mod head;
pub mod listener;
pub mod rewind;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use head::{read_head, HeadError, ReadHead};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use rewind::Rewind;
