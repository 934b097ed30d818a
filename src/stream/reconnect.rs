//! Bounded, single-flight reconnection bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Outcome of asking for another reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt`.
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// A reconnection is already scheduled; this trigger is dropped.
    AlreadyPending,
    /// No attempts left.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Attempt counter with a fixed delay and a single-flight guard.
#[derive(Debug)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    interval: Duration,
    attempts: AtomicU32,
    scheduled: AtomicBool,
}

impl ReconnectPolicy {
    /// Create a policy allowing `max_attempts` retries `interval` apart.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempts: AtomicU32::new(0),
            scheduled: AtomicBool::new(false),
        }
    }

    /// Claim the next attempt.
    ///
    /// A `Retry` holds the guard until `finish` is called.
    pub fn begin(&self) -> ReconnectDecision {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return ReconnectDecision::AlreadyPending;
        }

        let attempted = self.attempts.load(Ordering::SeqCst);
        if attempted >= self.max_attempts {
            self.scheduled.store(false, Ordering::SeqCst);
            return ReconnectDecision::Exhausted {
                attempts: attempted,
            };
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        ReconnectDecision::Retry {
            attempt,
            delay: self.interval,
        }
    }

    /// Release the guard after an attempt has been made.
    pub fn finish(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
    }

    /// Forget past attempts after a successful connection.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Attempts made since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether a reconnection is currently scheduled.
    pub fn is_pending(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Configured limit.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
