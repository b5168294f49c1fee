//! Keyword backfill against the two historical search mirrors.
//!
//! Both mirrors serve the same comment archive but trail live Reddit by a
//! varying lag and fail independently. [`SearchClient`] tracks lag and
//! failures per endpoint and picks the one most likely to answer with fresh
//! data.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redwrap_core::{CoreError, RecencySet, SearchComment};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub const PRIMARY_BASE_URL: &str = "https://api.pushshift.io/reddit/comment/search";
pub const BETA_BASE_URL: &str = "https://beta.pushshift.io/search/reddit/comments";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LAG_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const DEFAULT_LAG_SECONDS: i64 = 10;
const LAG_CHECK_INTERVAL_SECONDS: i64 = 2 * 60;
const BETA_PREFERRED_LAG_SECONDS: i64 = 2 * 60;
const FAILED_ENDPOINT_MAX_LAG_SECONDS: i64 = 10 * 60;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const FIRST_PAGE_SIZE: usize = 100;
const PAGE_SIZE: usize = 1000;
const LONG_GAP_WARNING: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Primary,
    Beta,
}

impl EndpointKind {
    /// Query parameters for a newest-first page, each mirror with its own
    /// names for the page size and the time cursor.
    fn query(
        &self,
        keyword: Option<&str>,
        limit: usize,
        before: Option<i64>,
    ) -> Vec<(&'static str, String)> {
        let (size_param, cursor_param) = match self {
            EndpointKind::Primary => ("limit", "before"),
            EndpointKind::Beta => ("size", "until"),
        };

        let mut query = vec![(size_param, limit.to_string()), ("sort", "desc".to_string())];
        if let Some(keyword) = keyword {
            query.push(("q", keyword.to_string()));
        }
        if let Some(before) = before {
            query.push((cursor_param, before.to_string()));
        }
        query
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Primary => f.write_str("primary"),
            EndpointKind::Beta => f.write_str("beta"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Auto,
    PrimaryOnly,
    BetaOnly,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchMode::Auto),
            "primary" | "primary-only" => Ok(SearchMode::PrimaryOnly),
            "beta" | "beta-only" => Ok(SearchMode::BetaOnly),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<SearchComment>,
}

/// Health and freshness of one mirror. Never persisted.
#[derive(Debug, Clone)]
pub struct SearchEndpoint {
    kind: EndpointKind,
    base_url: Url,
    failures: u32,
    failure_threshold: u32,
    lag_seconds: i64,
    lag_checked: Option<DateTime<Utc>>,
    last_request: Option<Duration>,
}

impl SearchEndpoint {
    pub fn new(kind: EndpointKind, base_url: Url) -> Self {
        Self {
            kind,
            base_url,
            failures: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            lag_seconds: DEFAULT_LAG_SECONDS,
            lag_checked: None,
            last_request: None,
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn lag_seconds(&self) -> i64 {
        self.lag_seconds
    }

    pub fn lag_checked(&self) -> Option<DateTime<Utc>> {
        self.lag_checked
    }

    /// How long the most recent lag check took.
    pub fn last_request(&self) -> Option<Duration> {
        self.last_request
    }

    fn needs_lag_check(&self, now: DateTime<Utc>) -> bool {
        match self.lag_checked {
            None => true,
            Some(checked) => now - checked > ChronoDuration::seconds(LAG_CHECK_INTERVAL_SECONDS),
        }
    }

    /// One page of comments, newest first. Any transport error or non-200
    /// status counts as a failure and comes back as a description.
    pub async fn get_comments(
        &mut self,
        http_client: &Client,
        keyword: Option<&str>,
        limit: usize,
        before: Option<i64>,
        lag_check: bool,
    ) -> Result<Vec<SearchComment>, String> {
        let timeout = if lag_check {
            LAG_CHECK_TIMEOUT
        } else {
            REQUEST_TIMEOUT
        };

        let result = self.fetch_page(http_client, keyword, limit, before, timeout).await;
        if result.is_err() {
            self.failures += 1;
        }
        result
    }

    async fn fetch_page(
        &self,
        http_client: &Client,
        keyword: Option<&str>,
        limit: usize,
        before: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<SearchComment>, String> {
        let response = http_client
            .get(self.base_url.clone())
            .query(&self.kind.query(keyword, limit, before))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", self.kind, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("{} returned status {}", self.kind, status));
        }

        let page: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("{} returned unparseable data: {}", self.kind, e))?;
        Ok(page.data)
    }

    /// Fetches the newest comment and records how far behind now it is. A
    /// failed check keeps the previous lag.
    pub async fn check_lag(&mut self, http_client: &Client) {
        let start = Instant::now();
        let result = self.get_comments(http_client, None, 1, None, true).await;
        self.last_request = Some(start.elapsed());

        let now = Utc::now();
        self.lag_checked = Some(now);
        match result {
            Ok(comments) => match comments.first() {
                Some(newest) => {
                    self.lag_seconds = (now - newest.created()).num_seconds();
                    debug!(
                        "{} lag is {} seconds, check took {:?}",
                        self.kind, self.lag_seconds, self.last_request
                    );
                }
                None => debug!("{} lag check returned no comments", self.kind),
            },
            Err(description) => warn!("Lag check failed: {}", description),
        }
    }

    fn record_success(&mut self) {
        if self.failures > 0 {
            info!(
                "Recovered {} search after {} failures",
                self.kind, self.failures
            );
        }
        self.failures = 0;
        self.failure_threshold = DEFAULT_FAILURE_THRESHOLD;
    }
}

/// Picks the endpoint to query in [`SearchMode::Auto`].
///
/// Once either mirror has failed, freshness only matters among mirrors that
/// are less than ten minutes behind. Otherwise beta wins whenever it is less
/// than two minutes behind.
pub fn select_endpoint(primary: &SearchEndpoint, beta: &SearchEndpoint) -> EndpointKind {
    let lower_lag = if beta.lag_seconds < primary.lag_seconds {
        EndpointKind::Beta
    } else {
        EndpointKind::Primary
    };

    if primary.failures > 0 || beta.failures > 0 {
        let primary_usable = primary.lag_seconds < FAILED_ENDPOINT_MAX_LAG_SECONDS;
        let beta_usable = beta.lag_seconds < FAILED_ENDPOINT_MAX_LAG_SECONDS;
        return match (primary_usable, beta_usable) {
            (true, false) => EndpointKind::Primary,
            (false, true) => EndpointKind::Beta,
            _ => lower_lag,
        };
    }

    if beta.lag_seconds < BETA_PREFERRED_LAG_SECONDS {
        EndpointKind::Beta
    } else {
        lower_lag
    }
}

/// Historical keyword search with endpoint selection and a recency set of
/// already processed comment ids.
#[derive(Debug)]
pub struct SearchClient {
    http_client: Client,
    primary: SearchEndpoint,
    beta: SearchEndpoint,
    mode: SearchMode,
    processed: RecencySet,
    retry_delay: Duration,
}

impl SearchClient {
    pub fn new(user_agent: &str) -> Result<Self, CoreError> {
        Self::with_endpoints(user_agent, PRIMARY_BASE_URL, BETA_BASE_URL)
    }

    pub fn with_endpoints(
        user_agent: &str,
        primary_url: &str,
        beta_url: &str,
    ) -> Result<Self, CoreError> {
        let parse = |url: &str| {
            Url::parse(url).map_err(|e| CoreError::InvalidInput {
                message: format!("invalid search endpoint {url}: {e}"),
            })
        };

        let http_client = Client::builder().user_agent(user_agent).build()?;

        Ok(Self {
            http_client,
            primary: SearchEndpoint::new(EndpointKind::Primary, parse(primary_url)?),
            beta: SearchEndpoint::new(EndpointKind::Beta, parse(beta_url)?),
            mode: SearchMode::default(),
            processed: RecencySet::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Pause between retries of a failed page.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SearchMode) {
        self.mode = mode;
    }

    pub fn endpoint(&self, kind: EndpointKind) -> &SearchEndpoint {
        match kind {
            EndpointKind::Primary => &self.primary,
            EndpointKind::Beta => &self.beta,
        }
    }

    fn endpoint_parts(&mut self, kind: EndpointKind) -> (&Client, &mut SearchEndpoint) {
        match kind {
            EndpointKind::Primary => (&self.http_client, &mut self.primary),
            EndpointKind::Beta => (&self.http_client, &mut self.beta),
        }
    }

    pub fn choose_endpoint(&self) -> EndpointKind {
        match self.mode {
            SearchMode::PrimaryOnly => EndpointKind::Primary,
            SearchMode::BetaOnly => EndpointKind::Beta,
            SearchMode::Auto => select_endpoint(&self.primary, &self.beta),
        }
    }

    fn active_kinds(&self) -> &'static [EndpointKind] {
        match self.mode {
            SearchMode::PrimaryOnly => &[EndpointKind::Primary],
            SearchMode::BetaOnly => &[EndpointKind::Beta],
            SearchMode::Auto => &[EndpointKind::Primary, EndpointKind::Beta],
        }
    }

    /// Re-checks the lag of every endpoint the mode can use, if never checked,
    /// stale, or `force` is set.
    pub async fn refresh_lag(&mut self, force: bool) {
        let now = Utc::now();
        for &kind in self.active_kinds() {
            let (http_client, endpoint) = self.endpoint_parts(kind);
            if force || endpoint.needs_lag_check(now) {
                endpoint.check_lag(http_client).await;
            }
        }
    }

    /// Lag in seconds of the endpoint that would serve the next search.
    pub async fn effective_lag(&mut self) -> i64 {
        self.refresh_lag(false).await;
        self.endpoint(self.choose_endpoint()).lag_seconds
    }

    pub fn processed(&self) -> &RecencySet {
        &self.processed
    }

    pub fn mark_processed(&mut self, comment_id: &str) {
        self.processed.put(comment_id);
    }

    /// Fetches one page, retrying failures until the serving endpoint hits its
    /// failure threshold. `None` means this cycle gives up.
    async fn fetch_page_with_retry(
        &mut self,
        keyword: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Option<Vec<SearchComment>> {
        loop {
            let kind = self.choose_endpoint();
            let retry_delay = self.retry_delay;
            let (http_client, endpoint) = self.endpoint_parts(kind);

            match endpoint
                .get_comments(http_client, Some(keyword), limit, before, false)
                .await
            {
                Ok(comments) => {
                    endpoint.record_success();
                    return Some(comments);
                }
                Err(description) => {
                    warn!("Search for {} failed: {}", keyword, description);
                    if endpoint.failures >= endpoint.failure_threshold {
                        warn!(
                            "{} consecutive failures on {} for search term: {}",
                            endpoint.failures, kind, keyword
                        );
                        endpoint.failure_threshold *= 2;
                        return None;
                    }
                }
            }

            sleep(retry_delay).await;
        }
    }

    /// Every comment matching `keyword` created after `last_seen` and not yet
    /// processed, newest first. Pages backwards until it reaches `last_seen`.
    pub async fn get_keyword_comments(
        &mut self,
        keyword: &str,
        last_seen: DateTime<Utc>,
    ) -> Vec<SearchComment> {
        let last_seen = if self.processed.is_empty() {
            last_seen + ChronoDuration::seconds(1)
        } else {
            last_seen
        };
        let last_seen_ts = last_seen.timestamp();
        debug!(
            "Fetching comments for keyword: {} : {}",
            keyword,
            last_seen.format("%Y-%m-%d %H:%M:%S")
        );

        self.refresh_lag(false).await;

        let mut results = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut before: Option<i64> = None;
        let mut limit = FIRST_PAGE_SIZE;
        let mut warned_long_gap = false;

        loop {
            let Some(page) = self.fetch_page_with_retry(keyword, limit, before).await else {
                return Vec::new();
            };

            if page.is_empty() {
                match before {
                    None => warn!("No comments found for {}", keyword),
                    Some(_) => warn!(
                        "Ran out of results for {} before reaching {}, search lag may be stale",
                        keyword, last_seen
                    ),
                }
                break;
            }

            let mut reached_last_seen = false;
            for comment in &page {
                if comment.created_utc <= last_seen_ts {
                    reached_last_seen = true;
                    break;
                }
                if !self.processed.contains(&comment.id) && seen_ids.insert(comment.id.clone()) {
                    results.push(comment.clone());
                }
            }
            if reached_last_seen {
                break;
            }

            let oldest = page.iter().map(|comment| comment.created_utc).min();
            if oldest == before {
                warn!(
                    "Search for {} is stuck at timestamp {:?}, stopping",
                    keyword, oldest
                );
                break;
            }

            if results.len() > LONG_GAP_WARNING && !warned_long_gap {
                warn!(
                    "Found {} comments for {} and still haven't reached {}",
                    results.len(),
                    keyword,
                    last_seen
                );
                warned_long_gap = true;
            }

            before = oldest;
            limit = PAGE_SIZE;
        }

        debug!("Found comments: {}", results.len());
        results
    }
}
