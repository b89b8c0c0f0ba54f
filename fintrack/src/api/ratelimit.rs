//! Outbound request throttle.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Capacity-1 bucket: at most one call per `interval`, no bursts.
///
/// Waiters are served in arrival order. There is no background refill task;
/// the next free slot is stored and each caller sleeps until it.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::const_new(None),
        }
    }

    /// Wait for the next slot.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = next_slot.map_or(now, |at| at.max(now));
        if slot > now {
            sleep_until(slot).await;
        }
        *next_slot = Some(slot + self.interval);
    }
}
