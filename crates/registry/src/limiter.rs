//! Minimum inter-request interval gate for registry calls.
//!
//! The registry enforces a hard global rate limit, so N lookups take at
//! least N x interval no matter how much concurrency exists elsewhere.
//! [`RequestPacer::acquire`] serializes callers through a single async
//! mutex and sleeps until the interval since the previous request has
//! elapsed.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum interval between requests without a registry credential.
pub const ANONYMOUS_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Minimum interval between requests with an operator-supplied credential.
pub const AUTHENTICATED_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Pick the pacing interval based on credential presence.
pub fn interval_for_credential(has_credential: bool) -> Duration {
    if has_credential {
        AUTHENTICATED_MIN_INTERVAL
    } else {
        ANONYMOUS_MIN_INTERVAL
    }
}

/// Serializes registry requests and enforces the minimum interval.
pub struct RequestPacer {
    min_interval: Duration,
    /// Instant of the most recent release. The mutex is held across the
    /// wait so concurrent callers queue up rather than racing the clock.
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// The configured minimum interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
