//! Shared outbound rate limiter.
//!
//! All callers hitting a throttled upstream share one instance behind an
//! `Arc`; `acquire` parks the caller until at least `1/qps` seconds have
//! passed since the previous grant, across every concurrent caller.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval limiter over a single mutex-guarded last-grant stamp.
///
/// The mutex is deliberately held across the sleep: waiters queue on the
/// lock, so grants stay monotonic and no caller can be reordered past
/// another by more than one interval. Never fails, never times out.
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter granting at most `qps` permits per second.
    /// QPS is floored at 0.1 to keep the interval finite.
    pub fn new(qps: f64) -> Self {
        let qps = qps.max(0.1);
        Self {
            min_interval: Duration::from_secs_f64(1.0 / qps),
            last_grant: Mutex::new(None),
        }
    }

    /// Block until the next grant is due, then take it.
    pub async fn acquire(&self) {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let due = prev + self.min_interval;
            let now = Instant::now();
            if now < due {
                tokio::time::sleep(due - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}
