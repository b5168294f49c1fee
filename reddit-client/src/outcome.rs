//! Translation of API failures into [`ReturnType`] codes, with in-place
//! retries for Reddit's RATELIMIT errors.

use redwrap_core::{ApiErrorItem, CoreError, RedditApiError, ReturnType};
use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

static RATELIMIT_WAIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,3}) (milliseconds?|seconds?|minutes?)").expect("valid ratelimit regex")
});

/// Result of one facade call: the operation's output when it succeeded and
/// the outcome code callers branch on.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub output: Option<T>,
    pub result: ReturnType,
    /// Total seconds slept waiting out RATELIMIT errors.
    pub slept_seconds: u64,
}

impl<T> Outcome<T> {
    fn done(output: Option<T>, result: ReturnType, slept_seconds: u64) -> Self {
        Self {
            output,
            result,
            slept_seconds,
        }
    }
}

/// Seconds Reddit asks us to wait, read from the first RATELIMIT item.
///
/// Only the first RATELIMIT item is examined: if its message carries no
/// duration the scan stops there and `None` is returned. Sub-second waits
/// count as one second.
pub fn ratelimit_seconds(items: &[ApiErrorItem]) -> Option<u64> {
    let item = items.iter().find(|item| item.error_type == "RATELIMIT")?;
    let captures = RATELIMIT_WAIT.captures(&item.message)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str();

    let seconds = if unit.starts_with("millisecond") {
        1
    } else if unit.starts_with("minute") {
        amount * 60
    } else {
        amount
    };
    Some(seconds.max(1))
}

/// Runs `operation`, mapping expected API failures to [`ReturnType`] codes.
///
/// A RATELIMIT error is retried after sleeping for the requested wait as long
/// as the wait fits in `retry_seconds`; the budget shrinks by every wait.
/// When no wait can be parsed the call is retried exactly once with no budget
/// left. Error identifiers outside the known set are returned as `Err`.
pub async fn run_with_outcome<T, F, Fut>(
    mut operation: F,
    retry_seconds: u64,
) -> Result<Outcome<T>, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut budget = retry_seconds;
    let mut slept = 0;
    let mut blind_retry_used = false;

    loop {
        let items = match operation().await {
            Ok(output) => return Ok(Outcome::done(Some(output), ReturnType::Success, slept)),
            Err(CoreError::RedditApi(RedditApiError::Api { items })) => items,
            Err(CoreError::RedditApi(RedditApiError::Forbidden { resource })) => {
                info!("Forbidden: {}", resource);
                return Ok(Outcome::done(None, ReturnType::Forbidden, slept));
            }
            Err(CoreError::RedditApi(RedditApiError::Quarantined { resource })) => {
                info!("Quarantined: {}", resource);
                return Ok(Outcome::done(None, ReturnType::Quarantined, slept));
            }
            Err(e) => return Err(e),
        };

        let error_type = items
            .first()
            .map(|item| item.error_type.clone())
            .unwrap_or_default();
        let Some(result) = ReturnType::from_error_type(&error_type) else {
            warn!("Unrecognized API error: {}", error_type);
            return Err(RedditApiError::Api { items }.into());
        };

        if result != ReturnType::Ratelimit {
            return Ok(Outcome::done(None, result, slept));
        }

        match ratelimit_seconds(&items) {
            Some(wait) if wait <= budget => {
                warn!(
                    "Got ratelimit message, sleeping {} seconds ({} left in budget)",
                    wait, budget
                );
                sleep(Duration::from_secs(wait)).await;
                budget -= wait;
                slept += wait;
            }
            Some(wait) => {
                warn!(
                    "Got ratelimit message, {} seconds is more than the {} second budget",
                    wait, budget
                );
                return Ok(Outcome::done(None, ReturnType::Ratelimit, slept));
            }
            None if !blind_retry_used => {
                warn!(
                    "Couldn't find a wait time in ratelimit message, retrying once: {:?}",
                    items
                );
                blind_retry_used = true;
                budget = 0;
            }
            None => {
                warn!("Ratelimited again after retrying: {:?}", items);
                return Ok(Outcome::done(None, ReturnType::Ratelimit, slept));
            }
        }
    }
}
