//! Minimum spacing between outbound model calls.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Shared "last call" watermark enforcing a minimum gap between calls.
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// until it arrives, so overlapping callers are spaced too.
#[derive(Debug)]
pub struct CallSpacer {
    min_interval: Duration,
    last_slot: Mutex<Option<Instant>>,
}

impl CallSpacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_slot: Mutex::new(None),
        }
    }

    /// Wait until this caller may issue its call.
    pub async fn wait_turn(&self) {
        let wait = {
            let mut last = self.last_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *last {
                Some(prev) => (prev + self.min_interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot - now
        };

        if !wait.is_zero() {
            tracing::debug!(
                name: "llm.spacing.wait",
                wait_ms = wait.as_millis(),
                "Rate limiting: waiting before next request"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
