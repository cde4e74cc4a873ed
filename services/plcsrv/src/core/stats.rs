//! Failure statistics
//!
//! Owned by the single scheduler instance for the device; the health API
//! reads concurrently. Single-writer atomics keep reads snapshot-consistent
//! without a lock.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct FailureTracker {
    connection_errors: AtomicU64,
    read_errors: AtomicU64,
    consecutive_failures: AtomicU64,
    /// Epoch milliseconds of the last real-transport success; 0 = never
    last_success_ms: AtomicI64,
}

/// Point-in-time view of the tracker, serialized by the health API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSnapshot {
    pub connection_errors: u64,
    pub read_errors: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A whole-cycle connection failure
    pub fn record_connection_failure(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A single data point failed; the cycle itself keeps going
    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was up but no point produced a value
    pub fn record_cycle_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// At least one value came through the real transport this cycle.
    /// Synthetic cycles must never reach this.
    pub fn record_cycle_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FailureSnapshot {
        let last_ms = self.last_success_ms.load(Ordering::Relaxed);
        FailureSnapshot {
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success: (last_ms > 0)
                .then(|| Utc.timestamp_millis_opt(last_ms).single())
                .flatten(),
        }
    }
}
