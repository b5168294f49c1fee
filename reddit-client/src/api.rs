use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimiter, HEADER_RESET};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RefreshToken, TokenResponse,
    TokenUrl,
};
use redwrap_core::{
    timestamp_from_epoch, ApiErrorItem, Comment, CoreError, Message, RedditApiError,
    RedditCredentials, Submission, Thing, ThingKind,
};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const INFO_BATCH_SIZE: usize = 100;
const LISTING_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    #[serde(default)]
    pub body: String,
    pub created_utc: f64,
    pub permalink: Option<String>,
    pub link_id: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditLinkData {
    pub id: String,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub selftext: String,
    pub created_utc: f64,
    pub permalink: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub locked: bool,
    pub link_flair_text: Option<String>,
    pub removed_by_category: Option<String>,
}

/// Inbox entry. Private messages and comment replies share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditMessageData {
    pub id: String,
    pub author: Option<String>,
    pub dest: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub created_utc: f64,
    pub parent_id: Option<String>,
    pub subreddit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditUserData {
    pub name: String,
    pub created_utc: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditWikiPageData {
    pub content_md: String,
}

impl From<RedditCommentData> for Comment {
    fn from(data: RedditCommentData) -> Self {
        Self {
            id: data.id,
            author: data.author,
            subreddit: data.subreddit,
            body: data.body,
            created_utc: timestamp_from_epoch(data.created_utc),
            permalink: data.permalink,
            link_id: data.link_id,
            parent_id: data.parent_id,
        }
    }
}

impl From<RedditLinkData> for Submission {
    fn from(data: RedditLinkData) -> Self {
        Self {
            id: data.id,
            author: data.author,
            subreddit: data.subreddit,
            title: data.title,
            selftext: data.selftext,
            created_utc: timestamp_from_epoch(data.created_utc),
            permalink: data.permalink,
            url: data.url,
            locked: data.locked,
            link_flair_text: data.link_flair_text,
            removed_by_category: data.removed_by_category,
        }
    }
}

impl RedditMessageData {
    fn into_message(self, kind: ThingKind) -> Message {
        Message {
            id: self.id,
            kind,
            author: self.author,
            dest: self.dest,
            subject: self.subject,
            body: self.body,
            created_utc: timestamp_from_epoch(self.created_utc),
            parent_id: self.parent_id,
            subreddit: self.subreddit,
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at
            .map_or(true, |expires_at| expires_at > now + TOKEN_EXPIRY_MARGIN)
    }
}

#[derive(Debug)]
enum Authenticator {
    /// Pre-issued bearer token, never refreshed.
    Static(String),
    RefreshToken {
        oauth: BasicClient,
        refresh_token: RefreshToken,
        cached: Mutex<Option<CachedToken>>,
    },
}

/// Authenticated HTTP boundary to the Reddit OAuth API.
///
/// All requests go through [`RedditApiClient::send`], which waits on the rate
/// limiter, records metrics, and turns non-success statuses into
/// [`RedditApiError`] variants.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: String,
    auth: Authenticator,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
}

impl RedditApiClient {
    /// Client authenticating with a refresh token from the config file.
    pub fn new(credentials: &RedditCredentials, user_agent: String) -> Result<Self, CoreError> {
        let invalid = |e: oauth2::url::ParseError| RedditApiError::AuthenticationFailed {
            reason: e.to_string(),
        };
        let oauth = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(invalid)?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(invalid)?),
        );

        let auth = Authenticator::RefreshToken {
            oauth,
            refresh_token: RefreshToken::new(credentials.refresh_token.clone()),
            cached: Mutex::new(None),
        };
        Self::build(auth, user_agent)
    }

    /// Client using a fixed bearer token.
    pub fn with_access_token(access_token: String, user_agent: String) -> Result<Self, CoreError> {
        Self::build(Authenticator::Static(access_token), user_agent)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build(auth: Authenticator, user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(REQUEST_TIMEOUT)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            base_url: REDDIT_API_BASE.to_string(),
            auth,
            rate_limiter: Arc::new(RateLimiter::new()),
            metrics: Arc::new(MetricsCollector::new()),
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        let (oauth, refresh_token, cached) = match &self.auth {
            Authenticator::Static(token) => return Ok(token.clone()),
            Authenticator::RefreshToken {
                oauth,
                refresh_token,
                cached,
            } => (oauth, refresh_token, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.access_token.clone());
        }

        debug!("Refreshing Reddit access token");
        let http_client = self.http_client.clone();
        let response = oauth
            .exchange_refresh_token(refresh_token)
            .request_async(|request| token_request(http_client, request))
            .await
            .map_err(|e| {
                error!("Token refresh failed: {}", e);
                RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                }
            })?;

        let token = CachedToken {
            access_token: response.access_token().secret().clone(),
            expires_at: response.expires_in().map(|ttl| Instant::now() + ttl),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        form: Option<&[(&str, String)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let access_token = self.access_token().await?;

        let permit = self.rate_limiter.acquire_permit().await;
        if permit.queue_wait_time > Duration::from_secs(1) {
            info!(
                "Waited {:?} on the rate limit before {} {}",
                permit.queue_wait_time, method, endpoint
            );
        }

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(&[("raw_json", "1")])
            .query(query);
        if let Some(form) = form {
            request_builder = request_builder.form(form);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let start_time = Instant::now();
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                self.record(endpoint, None, start_time.elapsed()).await;
                return Err(if e.is_timeout() {
                    RedditApiError::RequestTimeout.into()
                } else {
                    CoreError::Network(e)
                });
            }
        };

        let status = response.status();
        self.rate_limiter
            .update_from_headers(response.headers())
            .await;
        self.record(endpoint, Some(status), start_time.elapsed())
            .await;

        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        warn!("Request failed with status: {} for {}", status, endpoint);
        Err(status_error(endpoint, response).await.into())
    }

    async fn record(&self, endpoint: &str, status: Option<StatusCode>, response_time: Duration) {
        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                status_code: status.map(|s| s.as_u16()),
                response_time,
            })
            .await;
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self.send(Method::GET, endpoint, query, None).await?;
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {endpoint}"),
            }
            .into()
        })
    }

    /// POSTs a form and returns the `json.data` object of the reply (or the
    /// whole body for endpoints that do not wrap it). Any `json.errors` entry
    /// becomes [`RedditApiError::Api`].
    pub async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<Value, CoreError> {
        let response = self.send(Method::POST, endpoint, &[], Some(form)).await?;
        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::from(RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {endpoint}"),
            })
        })?;

        let items = api_errors(&body);
        if !items.is_empty() {
            return Err(RedditApiError::Api { items }.into());
        }

        Ok(match body.pointer("/json/data") {
            Some(data) => data.clone(),
            None => body,
        })
    }

    pub async fn get_me(&self) -> Result<RedditUserData, CoreError> {
        let user: RedditUserData = self.get_json("/api/v1/me", &[]).await?;
        debug!("Retrieved user info for: {}", user.name);
        Ok(user)
    }

    pub async fn get_unread(&self, limit: usize) -> Result<Vec<Message>, CoreError> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        while messages.len() < limit {
            let page_size = LISTING_PAGE_SIZE.min(limit - messages.len());
            let mut query = vec![("limit", page_size.to_string())];
            if let Some(after) = &after {
                query.push(("after", after.clone()));
            }

            let listing: RedditListing<RedditMessageData> =
                self.get_json("/message/unread", &query).await?;
            let page_len = listing.data.children.len();
            messages.extend(listing.data.children.into_iter().map(|child| {
                let kind = ThingKind::from_prefix(&child.kind).unwrap_or(ThingKind::Message);
                child.data.into_message(kind)
            }));

            match listing.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        debug!("Retrieved {} unread messages", messages.len());
        Ok(messages)
    }

    pub async fn mark_read(&self, fullname: &str) -> Result<(), CoreError> {
        self.post_form("/api/read_message", &[("id", fullname.to_string())])
            .await?;
        Ok(())
    }

    /// Replies to `parent_fullname`, returning the new comment's id when the
    /// API reports one.
    pub async fn comment(
        &self,
        parent_fullname: &str,
        text: &str,
    ) -> Result<Option<String>, CoreError> {
        let data = self
            .post_form(
                "/api/comment",
                &[
                    ("api_type", "json".to_string()),
                    ("thing_id", parent_fullname.to_string()),
                    ("text", text.to_string()),
                ],
            )
            .await?;

        Ok(data
            .pointer("/things/0/data/id")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub async fn compose(&self, to: &str, subject: &str, text: &str) -> Result<(), CoreError> {
        self.post_form(
            "/api/compose",
            &[
                ("api_type", "json".to_string()),
                ("to", to.to_string()),
                ("subject", subject.to_string()),
                ("text", text.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn edit(&self, fullname: &str, text: &str) -> Result<(), CoreError> {
        self.post_form(
            "/api/editusertext",
            &[
                ("api_type", "json".to_string()),
                ("thing_id", fullname.to_string()),
                ("text", text.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn delete(&self, fullname: &str) -> Result<(), CoreError> {
        self.post_form("/api/del", &[("id", fullname.to_string())])
            .await?;
        Ok(())
    }

    /// Looks up comments and submissions by fullname, in batches.
    pub async fn info(&self, fullnames: &[String]) -> Result<Vec<Thing>, CoreError> {
        let mut things = Vec::with_capacity(fullnames.len());
        for batch in fullnames.chunks(INFO_BATCH_SIZE) {
            let listing: RedditListing<Value> = self
                .get_json("/api/info", &[("id", batch.join(","))])
                .await?;
            for child in listing.data.children {
                if let Some(thing) = thing_from_child(child)? {
                    things.push(thing);
                }
            }
        }
        Ok(things)
    }

    pub async fn subreddit_about(&self, name: &str) -> Result<Value, CoreError> {
        self.get_json(&format!("/r/{name}/about"), &[]).await
    }

    pub async fn user_about(&self, name: &str) -> Result<RedditUserData, CoreError> {
        let child: RedditListingChild<RedditUserData> =
            self.get_json(&format!("/user/{name}/about"), &[]).await?;
        Ok(child.data)
    }

    /// Newest submissions of a subreddit (or `a+b` multireddit), paging with
    /// the `after` cursor until `limit` items or the listing ends.
    pub async fn subreddit_new(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, CoreError> {
        let endpoint = format!("/r/{name}/new");
        let mut submissions = Vec::new();
        let mut after: Option<String> = None;

        while submissions.len() < limit {
            let page_size = LISTING_PAGE_SIZE.min(limit - submissions.len());
            let mut query = vec![("limit", page_size.to_string())];
            if let Some(after) = &after {
                query.push(("after", after.clone()));
            }

            let listing: RedditListing<RedditLinkData> = self.get_json(&endpoint, &query).await?;
            let page_len = listing.data.children.len();
            submissions.extend(listing.data.children.into_iter().map(|c| Submission::from(c.data)));

            match listing.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        debug!("Retrieved {} submissions from r/{}", submissions.len(), name);
        Ok(submissions)
    }

    pub async fn quarantine_opt_in(&self, name: &str) -> Result<(), CoreError> {
        self.post_form("/api/quarantine_optin", &[("sr_name", name.to_string())])
            .await?;
        Ok(())
    }

    pub async fn wiki_page(&self, subreddit: &str, page: &str) -> Result<String, CoreError> {
        let child: RedditListingChild<RedditWikiPageData> = self
            .get_json(&format!("/r/{subreddit}/wiki/{page}"), &[])
            .await?;
        Ok(child.data.content_md)
    }

    pub async fn edit_wiki_page(
        &self,
        subreddit: &str,
        page: &str,
        content: &str,
        reason: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut form = vec![
            ("page", page.to_string()),
            ("content", content.to_string()),
        ];
        if let Some(reason) = reason {
            form.push(("reason", reason.to_string()));
        }
        self.post_form(&format!("/r/{subreddit}/api/wiki/edit"), &form)
            .await?;
        Ok(())
    }
}

fn thing_from_child(child: RedditListingChild<Value>) -> Result<Option<Thing>, CoreError> {
    let thing = match ThingKind::from_prefix(&child.kind) {
        Some(ThingKind::Comment) => {
            let data: RedditCommentData = serde_json::from_value(child.data)?;
            Some(Thing::Comment(data.into()))
        }
        Some(ThingKind::Link) => {
            let data: RedditLinkData = serde_json::from_value(child.data)?;
            Some(Thing::Submission(data.into()))
        }
        _ => {
            debug!("Skipping unsupported thing kind {}", child.kind);
            None
        }
    };
    Ok(thing)
}

/// Extracts `json.errors`, an array of `[identifier, message, field]` triples.
pub(crate) fn api_errors(body: &Value) -> Vec<ApiErrorItem> {
    let Some(errors) = body.pointer("/json/errors").and_then(Value::as_array) else {
        return Vec::new();
    };

    errors
        .iter()
        .filter_map(|entry| {
            let parts = entry.as_array()?;
            Some(ApiErrorItem {
                error_type: parts.first()?.as_str()?.to_string(),
                message: parts
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                field: parts.get(2).and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

async fn status_error(endpoint: &str, response: Response) -> RedditApiError {
    let status = response.status();
    let resource = endpoint.to_string();

    if status.is_redirection() {
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        return RedditApiError::Redirect { resource, location };
    }

    match status {
        StatusCode::BAD_REQUEST => RedditApiError::BadRequest { resource },
        StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
        StatusCode::FORBIDDEN => {
            let body: Value = response.json().await.unwrap_or_default();
            if body.get("reason").and_then(Value::as_str) == Some("quarantined") {
                RedditApiError::Quarantined { resource }
            } else {
                RedditApiError::Forbidden { resource }
            }
        }
        StatusCode::NOT_FOUND => RedditApiError::NotFound { resource },
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(HEADER_RESET)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map_or(60, |seconds| seconds.ceil() as u64);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        status if status.is_server_error() => RedditApiError::ServerError {
            status_code: status.as_u16(),
        },
        status => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {status} for {endpoint}"),
        },
    }
}

// Token exchange through our own client so the request carries the
// configured User-Agent, which Reddit requires.
async fn token_request(
    http_client: Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
