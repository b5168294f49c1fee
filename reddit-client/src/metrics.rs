use crate::rate_limiter::RateLimitStatus;
use redwrap_core::ReturnType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Responses with status 429.
    pub throttled_requests: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_endpoint: BTreeMap<String, EndpointMetrics>,
    pub rate_limits_by_account: HashMap<String, AccountRateLimits>,
    /// Facade results keyed by outcome name, e.g. `THREAD_LOCKED`.
    pub outcomes: BTreeMap<String, u64>,
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        average(self.total_response_time, self.total_requests)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub last_status_code: Option<u16>,
}

impl EndpointMetrics {
    pub fn average_response_time(&self) -> Duration {
        average(self.total_response_time, self.request_count)
    }
}

/// Per-account gauges mirroring the server-reported rate limit window, and a
/// counter of the seconds spent sleeping on RATELIMIT errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountRateLimits {
    pub requests_remaining: f64,
    pub requests_used: u64,
    pub seconds_remaining: u64,
    pub ratelimit_slept_seconds: u64,
}

/// One finished HTTP exchange. `status_code` is `None` when no response
/// arrived at all.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
}

impl RequestMetrics {
    fn failed(&self) -> bool {
        !self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        total / count as u32
    }
}

/// In-process collector owned by one API client. Shared through an `Arc` with
/// whoever wants to read the numbers.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, request: RequestMetrics) {
        let failed = request.failed();
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.total_response_time += request.response_time;
        metrics.last_request_time = Some(SystemTime::now());
        if failed {
            metrics.failed_requests += 1;
        }
        if request.status_code == Some(429) {
            metrics.throttled_requests += 1;
        }

        let endpoint = metrics
            .requests_by_endpoint
            .entry(request.endpoint)
            .or_default();
        endpoint.request_count += 1;
        endpoint.total_response_time += request.response_time;
        endpoint.last_status_code = request.status_code;
        if failed {
            endpoint.error_count += 1;
        }
    }

    pub async fn record_outcome(&self, result: ReturnType) {
        let mut metrics = self.metrics.write().await;
        *metrics.outcomes.entry(result.name().to_string()).or_default() += 1;
    }

    /// Copies the latest server window into the account's gauges. Unknown
    /// values keep whatever was recorded before.
    pub async fn record_rate_limits(&self, account: &str, status: &RateLimitStatus) {
        let mut metrics = self.metrics.write().await;
        let gauges = metrics
            .rate_limits_by_account
            .entry(account.to_string())
            .or_default();

        if let Some(remaining) = status.remaining {
            gauges.requests_remaining = remaining;
        }
        if let Some(used) = status.used {
            gauges.requests_used = used;
        }
        if let Some(seconds) = status.seconds_to_reset {
            gauges.seconds_remaining = seconds;
        }
    }

    pub async fn record_ratelimit_sleep(&self, account: &str, seconds: u64) {
        let mut metrics = self.metrics.write().await;
        metrics
            .rate_limits_by_account
            .entry(account.to_string())
            .or_default()
            .ratelimit_slept_seconds += seconds;
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_endpoint_metrics(&self, endpoint: &str) -> Option<EndpointMetrics> {
        let metrics = self.metrics.read().await;
        metrics.requests_by_endpoint.get(endpoint).cloned()
    }

    pub async fn get_account_rate_limits(&self, account: &str) -> Option<AccountRateLimits> {
        let metrics = self.metrics.read().await;
        metrics.rate_limits_by_account.get(account).cloned()
    }

    pub async fn outcome_count(&self, result: ReturnType) -> u64 {
        let metrics = self.metrics.read().await;
        metrics.outcomes.get(result.name()).copied().unwrap_or(0)
    }

    pub async fn export_metrics(&self) -> Result<String, serde_json::Error> {
        let metrics = self.get_metrics().await;
        serde_json::to_string_pretty(&metrics)
    }
}
