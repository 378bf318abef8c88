//! Reconnect backoff state used by the connection manager.

use std::time::Duration;

use super::config::BackoffPolicy;

/// Shifts beyond this saturate; `2^32` base units is already centuries.
const MAX_EXPONENT: u32 = 32;

/// Counts consecutive reconnect cycles and produces exponential delays.
#[derive(Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    retries: u32,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Consecutive reconnect cycles since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Record a successful connect.
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Delay for the current cycle, advancing the counter by one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.retries);
        self.retries = self.retries.saturating_add(1);
        delay
    }

    /// Delay applied to the `k`-th consecutive cycle: `base * 2^k`.
    pub fn delay_for(&self, k: u32) -> Duration {
        let factor = 1u32 << k.min(MAX_EXPONENT - 1);
        let delay = if k >= MAX_EXPONENT {
            Duration::MAX
        } else {
            self.policy.base.saturating_mul(factor)
        };
        match self.policy.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}
