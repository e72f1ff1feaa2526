//! Upgrade relay subsystem.
//!
//! # Data Flow
//! ```text
//! RequestHead + client socket + early bytes
//!     → session.rs (validate route, dial backend with timeout)
//!     → handshake.rs (render verbatim head, or synthesize 101)
//!     → pipe.rs (full-duplex copy, half-close propagation)
//!     → Closed
//! ```
//!
//! # Design Decisions
//! - One fresh backend connection per session, never pooled
//! - Protocol agnostic once piping starts: payload is never inspected
//! - Errors are scoped to the session; the relay itself keeps running

pub mod error;
pub mod handshake;
pub mod pipe;
pub mod session;

pub use error::RelayError;
pub use handshake::{accept_key, render_handshake, HeaderField, RequestHead};
pub use pipe::{PipeEnd, PipeOptions, PipeStats};
pub use session::{Relay, RelaySettings, SessionState, SessionSummary};
