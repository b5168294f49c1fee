pub mod api;
pub mod facade;
pub mod metrics;
pub mod outcome;
pub mod rate_limiter;
pub mod reddit;
pub mod search;
pub mod tester;

mod tests;

pub use api::RedditApiClient;
pub use facade::{RedditApi, DEFAULT_MESSAGE_COUNT, SUBREDDIT_SUBMISSION_LIMIT};
pub use metrics::{ApiMetrics, MetricsCollector};
pub use outcome::{run_with_outcome, Outcome};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use reddit::{default_user_agent, Reddit};
pub use search::{EndpointKind, SearchClient, SearchMode};
pub use tester::{FakeReddit, RedditObject, Subreddit, User};
