use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_USED: &str = "x-ratelimit-used";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Rate limit window as last reported by Reddit in the `x-ratelimit-*`
/// response headers.
#[derive(Debug, Clone, Default)]
struct ServerWindow {
    remaining: Option<f64>,
    used: Option<u64>,
    reset_at: Option<Instant>,
}

impl ServerWindow {
    fn seconds_to_reset(&self, now: Instant) -> Option<u64> {
        self.reset_at
            .map(|reset_at| reset_at.saturating_duration_since(now).as_secs())
    }

    fn wait_needed(&self, now: Instant) -> Option<Duration> {
        let remaining = self.remaining?;
        if remaining >= 1.0 {
            return None;
        }
        let wait = self.reset_at?.saturating_duration_since(now);
        (!wait.is_zero()).then_some(wait)
    }
}

/// Client-side throttle driven by the server's own accounting. Requests are
/// only held back once the server reports the window as exhausted.
#[derive(Debug, Default)]
pub struct RateLimiter {
    window: Mutex<ServerWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the current window resets if the server said no requests
    /// are left in it.
    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();

        let wait = {
            let window = self.window.lock().await;
            window.wait_needed(start_time)
        };

        if let Some(wait) = wait {
            tracing::warn!("Rate limit window exhausted, waiting {:?} for reset", wait);
            sleep(wait).await;
            let mut window = self.window.lock().await;
            window.remaining = None;
            window.reset_at = None;
        }

        RateLimitPermit {
            queue_wait_time: start_time.elapsed(),
        }
    }

    /// Records the window from a response's rate limit headers. Responses
    /// without the headers leave the previous window untouched.
    pub async fn update_from_headers(&self, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .map(str::to_string)
        };

        let remaining = header(HEADER_REMAINING).and_then(|v| v.parse::<f64>().ok());
        let used = header(HEADER_USED).and_then(|v| v.parse::<u64>().ok());
        let reset = header(HEADER_RESET).and_then(|v| v.parse::<f64>().ok());

        if remaining.is_none() && used.is_none() && reset.is_none() {
            return;
        }
        self.update(remaining, used, reset).await;
    }

    pub async fn update(
        &self,
        remaining: Option<f64>,
        used: Option<u64>,
        reset_seconds: Option<f64>,
    ) {
        let mut window = self.window.lock().await;
        if remaining.is_some() {
            window.remaining = remaining;
        }
        if used.is_some() {
            window.used = used;
        }
        if let Some(reset_seconds) = reset_seconds {
            window.reset_at =
                Some(Instant::now() + Duration::from_secs_f64(reset_seconds.max(0.0)));
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let window = self.window.lock().await;
        RateLimitStatus {
            remaining: window.remaining,
            used: window.used,
            seconds_to_reset: window.seconds_to_reset(Instant::now()),
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    pub queue_wait_time: Duration,
}

/// Snapshot of the server-reported window. Fields are `None` until the first
/// response carrying rate limit headers has been seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub remaining: Option<f64>,
    pub used: Option<u64>,
    pub seconds_to_reset: Option<u64>,
}

impl RateLimitStatus {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.remaining, Some(remaining) if remaining < 1.0)
    }

    pub fn utilization_percentage(&self) -> Option<f64> {
        let remaining = self.remaining?;
        let used = self.used? as f64;
        let total = used + remaining;
        (total > 0.0).then(|| used / total * 100.0)
    }
}
