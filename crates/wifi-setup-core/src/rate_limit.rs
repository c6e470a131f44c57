//! Fixed-window rate limiting for setup form submissions.
//!
//! Attempts are counted from the first attempt of a window. Once the window
//! has fully elapsed the next attempt opens a new window. Bursts straddling a
//! window boundary can exceed the nominal rate.

/// Default number of attempts allowed per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Outcome of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied,
}

impl RateDecision {
    pub fn is_allowed(self) -> bool {
        self == RateDecision::Allowed
    }
}

/// Fixed-window attempt counter.
///
/// Timestamps are milliseconds on any monotonic clock chosen by the caller.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_attempts: u32,
    window_ms: u64,
    window_start: Option<u64>,
    attempt_count: u32,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
            window_start: None,
            attempt_count: 0,
        }
    }

    /// Record an attempt at `now_ms` and decide whether it may proceed.
    pub fn check_and_record(&mut self, now_ms: u64) -> RateDecision {
        let window_open = match self.window_start {
            Some(start) => now_ms.saturating_sub(start) < self.window_ms,
            None => false,
        };

        if !window_open {
            self.window_start = Some(now_ms);
            self.attempt_count = 1;
            return RateDecision::Allowed;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.attempt_count > self.max_attempts {
            RateDecision::Denied
        } else {
            RateDecision::Allowed
        }
    }

    /// Attempts counted in the current window.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_MS)
    }
}
