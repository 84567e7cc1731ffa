// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential back-off with jitter for dial retries.

use rand::Rng;
use std::time::Duration;

/// Back-off schedule: `base * factor^attempt`, capped, with symmetric
/// jitter applied last.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    /// Fractional jitter; 0.2 means +/-20%.
    pub jitter: f64,
}

impl Backoff {
    /// The delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt.min(32) as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            capped * (1.0 + spread)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
