//! Rate Limiter - Decides when a run pauses

use bulkmail_common::types::{CountingMode, DispatchResult, RateLimitPolicy};
use std::time::Duration;
use tracing::debug;

/// Counter of attempts since the last pause
#[derive(Debug, Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    count: u32,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy, count: 0 }
    }

    /// Count an attempt according to the counting mode
    pub fn record_attempt(&mut self, result: DispatchResult) {
        let counts = match self.policy.mode() {
            CountingMode::AllAttempts => true,
            CountingMode::SuccessesOnly => result == DispatchResult::Success,
        };

        if counts {
            self.count += 1;
            debug!(
                "Rate limit counter at {}/{}",
                self.count,
                self.policy.threshold()
            );
        }
    }

    /// Whether the threshold has been reached
    pub fn should_pause(&self) -> bool {
        self.count >= self.policy.threshold()
    }

    /// How long to pause once the threshold is reached
    pub fn pause_duration(&self) -> Duration {
        self.policy.pause()
    }

    /// Zero the counter after a pause
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Attempts counted since the last pause
    pub fn count(&self) -> u32 {
        self.count
    }
}
