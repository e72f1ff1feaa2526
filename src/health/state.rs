//! Backend reachability state machine.
//!
//! # State Transitions
//! ```text
//! Unknown/Reachable   → Unreachable: consecutive failures >= unhealthy_threshold
//! Unknown/Unreachable → Reachable:   consecutive successes >= healthy_threshold
//! ```
//!
//! Hysteresis prevents flapping; counters of the opposite kind reset on
//! every observation.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Reachability as last observed by the monitor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Reachable = 1,
    Unreachable = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Reachable,
            2 => HealthState::Unreachable,
            _ => HealthState::Unknown,
        }
    }
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Reachable => "reachable",
            HealthState::Unreachable => "unreachable",
        }
    }
}

/// Shared, lock-free health record for the backend.
#[derive(Debug, Default)]
pub struct BackendHealth {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl BackendHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Report a successful check. Returns true on a state change.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Reachable {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Reachable as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Report a failed check. Returns true on a state change.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Unreachable {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unreachable as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}
