// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! A fixed minimum-gap pacer (§4.3): "all other send calls pace at a fixed
//! minimum inter-message gap ... to preempt rate limiting during bulk
//! populate."

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default inter-message gap enforced by the populator.
pub const DEFAULT_MIN_GAP: Duration = Duration::from_secs(2);

/// Serializes calls so consecutive sends are at least `min_gap` apart.
#[derive(Debug)]
pub struct Pacer {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    /// A pacer enforcing `min_gap` between consecutive [`Pacer::wait`] calls.
    #[must_use]
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_call: Mutex::new(None),
        }
    }

    /// Sleeps, if needed, so that at least `min_gap` has elapsed since the
    /// previous call returned, then records this call as the new baseline.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_does_not_wait() {
        let pacer = Pacer::new(Duration::from_millis(100));
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_waits_out_the_gap() {
        let pacer = Pacer::new(Duration::from_millis(100));
        pacer.wait().await;
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_gap_already_elapsed_does_not_wait() {
        let pacer = Pacer::new(Duration::from_millis(50));
        pacer.wait().await;
        tokio::time::advance(Duration::from_millis(60)).await;
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
