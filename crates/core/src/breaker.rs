//! One-way severity-accumulating circuit breaker.
//!
//! Unlike a conventional closed/open/half-open breaker, this one never
//! recovers: failures accumulate weighted by severity, and once the
//! threshold is reached the breaker is permanently open. A provider whose
//! breaker has tripped is finished; callers construct a new provider.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::warn;

/// Snapshot of breaker state for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub active: bool,
}

/// Monotonic failure accumulator with a permanent trip.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    failure_count: AtomicU32,
    active: AtomicBool,
}

impl CircuitBreaker {
    /// Create a breaker that trips once accumulated severity reaches
    /// `failure_threshold`.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            failure_count: AtomicU32::new(0),
            active: AtomicBool::new(true),
        }
    }

    /// Whether the breaker still admits work.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Record a failure of the given weight.
    ///
    /// Returns `true` when this call tripped the breaker (exactly once;
    /// later calls on an already-tripped breaker return `false`).
    pub fn record_failure(&self, weight: u32) -> bool {
        let count = self.failure_count.fetch_add(weight, Ordering::AcqRel) + weight;
        if count >= self.failure_threshold && self.active.swap(false, Ordering::AcqRel) {
            warn!(
                failure_count = count,
                failure_threshold = self.failure_threshold,
                "circuit breaker tripped; provider is terminating"
            );
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            failure_count: self.failure_count.load(Ordering::Acquire),
            failure_threshold: self.failure_threshold,
            active: self.is_active(),
        }
    }
}
