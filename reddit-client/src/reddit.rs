use crate::api::RedditApiClient;
use crate::facade::{RedditApi, SUBREDDIT_SUBMISSION_LIMIT};
use crate::metrics::MetricsCollector;
use crate::outcome::{run_with_outcome, Outcome};
use crate::search::SearchClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redwrap_core::{
    load_credentials, timestamp_from_epoch, Comment, CoreError, ErrorExt, Message,
    RedditApiError, ReturnType, SearchComment, Submission, Thing, ThingKind, PLACEHOLDER_ID,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DELETED_USER: &str = "[deleted]";

pub fn default_user_agent(account: &str) -> String {
    format!(
        "redwrap/{} (by u/{})",
        env!("CARGO_PKG_VERSION"),
        account
    )
}

/// Network-backed [`RedditApi`].
///
/// In dry-run mode (`no_post`) nothing is written to Reddit: mutating calls
/// log what they would have sent and report success.
#[derive(Debug)]
pub struct Reddit {
    api: RedditApiClient,
    search: SearchClient,
    metrics: Arc<MetricsCollector>,
    username: String,
    no_post: bool,
}

impl Reddit {
    /// Logs in with the credentials stored for `account` in `praw.ini`.
    pub async fn connect(
        account: &str,
        no_post: bool,
        prefix: Option<&str>,
        user_agent: Option<String>,
    ) -> Result<Self, CoreError> {
        info!(
            "Initializing reddit client: user={} prefix={:?} no_post={}",
            account, prefix, no_post
        );
        let credentials = load_credentials(account, prefix)?;
        let user_agent = user_agent.unwrap_or_else(|| default_user_agent(account));

        let api = RedditApiClient::new(&credentials, user_agent.clone())?;
        let search = SearchClient::new(&user_agent)?;
        Self::from_parts(api, search, no_post).await
    }

    /// Builds an adapter around already configured clients and resolves the
    /// logged in account name.
    pub async fn from_parts(
        api: RedditApiClient,
        search: SearchClient,
        no_post: bool,
    ) -> Result<Self, CoreError> {
        let username = api.get_me().await?.name;
        info!("Logged into reddit as u/{}", username);

        let metrics = api.metrics();
        let reddit = Self {
            api,
            search,
            metrics,
            username,
            no_post,
        };
        reddit.record_rate_limits().await;
        Ok(reddit)
    }

    pub fn is_dry_run(&self) -> bool {
        self.no_post
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub fn search_client(&self) -> &SearchClient {
        &self.search
    }

    pub fn search_client_mut(&mut self) -> &mut SearchClient {
        &mut self.search
    }

    async fn record_rate_limits(&self) {
        let status = self.api.rate_limiter().get_rate_limit_status().await;
        self.metrics
            .record_rate_limits(&self.username, &status)
            .await;
    }

    async fn run<T, F, Fut>(
        &self,
        operation: F,
        retry_seconds: u64,
    ) -> Result<Outcome<T>, CoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, CoreError>> + Send,
        T: Send,
    {
        let outcome = run_with_outcome(operation, retry_seconds).await;
        if let Ok(outcome) = &outcome {
            self.metrics.record_outcome(outcome.result).await;
            if outcome.slept_seconds > 0 {
                self.metrics
                    .record_ratelimit_sleep(&self.username, outcome.slept_seconds)
                    .await;
            }
        }
        self.record_rate_limits().await;
        outcome
    }

    async fn reply(
        &self,
        parent_fullname: &str,
        body: &str,
        retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError> {
        if self.no_post {
            info!("{}", body);
            return Ok((Some(PLACEHOLDER_ID.to_string()), ReturnType::Success));
        }

        let api = &self.api;
        let outcome = self
            .run(move || api.comment(parent_fullname, body), retry_seconds)
            .await?;

        Ok(match (outcome.output.flatten(), outcome.result) {
            (Some(id), result) => (Some(id), result),
            (None, ReturnType::Success) => (None, ReturnType::NothingReturned),
            (None, result) => (None, result),
        })
    }

    async fn fetch_thing(&self, fullname: String) -> Result<Option<Thing>, CoreError> {
        let things = self.api.info(&[fullname]).await?;
        self.record_rate_limits().await;
        Ok(things.into_iter().next())
    }
}

#[async_trait]
impl RedditApi for Reddit {
    fn username(&self) -> &str {
        &self.username
    }

    async fn get_messages(&mut self, count: usize) -> Result<Vec<Message>, CoreError> {
        debug!("Fetching unread messages");
        let messages = self.api.get_unread(count).await?;
        self.record_rate_limits().await;
        Ok(messages)
    }

    async fn reply_message(
        &mut self,
        message: &Message,
        body: &str,
        retry_seconds: u64,
    ) -> Result<ReturnType, CoreError> {
        debug!("Replying to message: {}", message.id);
        if self.no_post {
            info!("{}", body);
            return Ok(ReturnType::Success);
        }

        let fullname = message.fullname();
        let (_, result) = self.reply(&fullname, body, retry_seconds).await?;
        Ok(match result {
            ReturnType::NothingReturned => ReturnType::Success,
            result => result,
        })
    }

    async fn mark_read(&mut self, message: &Message) -> Result<ReturnType, CoreError> {
        debug!("Marking message as read: {}", message.id);
        if self.no_post {
            return Ok(ReturnType::Success);
        }

        let api = &self.api;
        let fullname = message.fullname();
        let fullname = fullname.as_str();
        let outcome = self.run(move || api.mark_read(fullname), 0).await?;
        Ok(outcome.result)
    }

    async fn get_submission(
        &mut self,
        submission_id: &str,
    ) -> Result<Option<Submission>, CoreError> {
        debug!("Fetching submission by id: {}", submission_id);
        if submission_id == PLACEHOLDER_ID {
            return Ok(None);
        }

        let thing = self
            .fetch_thing(ThingKind::Link.fullname(submission_id))
            .await?;
        Ok(match thing {
            Some(Thing::Submission(submission)) => Some(submission),
            _ => None,
        })
    }

    async fn get_comment(&mut self, comment_id: &str) -> Result<Option<Comment>, CoreError> {
        debug!("Fetching comment by id: {}", comment_id);
        if comment_id == PLACEHOLDER_ID {
            return Ok(None);
        }

        let thing = self
            .fetch_thing(ThingKind::Comment.fullname(comment_id))
            .await?;
        Ok(match thing {
            Some(Thing::Comment(comment)) => Some(comment),
            _ => None,
        })
    }

    async fn subreddit_exists(&mut self, subreddit_name: &str) -> Result<bool, CoreError> {
        debug!("Checking if subreddit exists: {}", subreddit_name);
        match self.api.subreddit_about(subreddit_name).await {
            Ok(_) => {
                self.record_rate_limits().await;
                Ok(true)
            }
            Err(CoreError::RedditApi(
                RedditApiError::NotFound { .. }
                | RedditApiError::Redirect { .. }
                | RedditApiError::Forbidden { .. }
                | RedditApiError::Quarantined { .. }
                | RedditApiError::BadRequest { .. },
            )) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn redditor_exists(&mut self, redditor_name: &str) -> Result<bool, CoreError> {
        debug!("Checking if redditor exists: {}", redditor_name);
        match self.api.user_about(redditor_name).await {
            Ok(_) => {
                self.record_rate_limits().await;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn edit_comment(
        &mut self,
        comment_id: &str,
        body: &str,
    ) -> Result<ReturnType, CoreError> {
        debug!("Editing comment: {}", comment_id);
        if self.no_post {
            info!("{}", body);
            return Ok(ReturnType::Success);
        }

        let api = &self.api;
        let fullname = ThingKind::Comment.fullname(comment_id);
        let fullname = fullname.as_str();
        let outcome = self.run(move || api.edit(fullname, body), 0).await?;
        Ok(outcome.result)
    }

    async fn delete_comment(&mut self, comment_id: &str) -> Result<ReturnType, CoreError> {
        debug!("Deleting comment: {}", comment_id);
        if self.no_post {
            return Ok(ReturnType::Success);
        }

        let api = &self.api;
        let fullname = ThingKind::Comment.fullname(comment_id);
        let fullname = fullname.as_str();
        let outcome = self.run(move || api.delete(fullname), 0).await?;
        Ok(outcome.result)
    }

    async fn send_message(
        &mut self,
        user_name: &str,
        subject: &str,
        body: &str,
        retry_seconds: u64,
    ) -> Result<ReturnType, CoreError> {
        debug!("Sending message to u/{}", user_name);
        if user_name == DELETED_USER {
            warn!("Trying to send message to u/{}, skipping", user_name);
            return Ok(ReturnType::InvalidUser);
        }
        if self.no_post {
            info!("{}", body);
            return Ok(ReturnType::Success);
        }

        let api = &self.api;
        let outcome = self
            .run(move || api.compose(user_name, subject, body), retry_seconds)
            .await?;
        Ok(outcome.result)
    }

    async fn reply_comment(
        &mut self,
        comment: &Comment,
        body: &str,
        retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError> {
        debug!("Replying to comment: {}", comment.id);
        self.reply(&comment.fullname(), body, retry_seconds).await
    }

    async fn reply_submission(
        &mut self,
        submission: &Submission,
        body: &str,
        retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError> {
        debug!("Replying to submission: {}", submission.id);
        self.reply(&submission.fullname(), body, retry_seconds).await
    }

    async fn get_subreddit_submissions(
        &mut self,
        subreddit_name: &str,
    ) -> Result<Vec<Submission>, CoreError> {
        debug!("Getting subreddit submissions: {}", subreddit_name);
        let submissions = self
            .api
            .subreddit_new(subreddit_name, SUBREDDIT_SUBMISSION_LIMIT)
            .await?;
        self.record_rate_limits().await;
        Ok(submissions)
    }

    async fn quarantine_opt_in(&mut self, subreddit_name: &str) -> bool {
        debug!("Opting in to subreddit: {}", subreddit_name);
        if self.no_post {
            return true;
        }

        match self.api.quarantine_opt_in(subreddit_name).await {
            Ok(()) => {
                self.record_rate_limits().await;
                true
            }
            Err(e) if e.is_access_denied() => {
                info!("Forbidden opting in to subreddit: {}", subreddit_name);
                false
            }
            Err(e) => {
                warn!("Error opting in to subreddit: {}", subreddit_name);
                e.log_warn();
                false
            }
        }
    }

    async fn get_user_creation_date(&mut self, user_name: &str) -> Option<DateTime<Utc>> {
        debug!("Getting user creation date: {}", user_name);
        let user = self.api.user_about(user_name).await.ok()?;
        self.record_rate_limits().await;
        user.created_utc.map(timestamp_from_epoch)
    }

    async fn call_info(&mut self, fullnames: &[String]) -> Result<Vec<Thing>, CoreError> {
        debug!("Fetching {} ids from info", fullnames.len());
        let things = self.api.info(fullnames).await?;
        self.record_rate_limits().await;
        Ok(things)
    }

    async fn get_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
    ) -> Result<Option<String>, CoreError> {
        debug!(
            "Getting subreddit wiki page: {} : {}",
            subreddit_name, page_name
        );
        let page = match self.api.wiki_page(subreddit_name, page_name).await {
            Ok(text) => {
                debug!("Fetch succeeded: {}", text.len());
                Some(text)
            }
            Err(e) if e.is_not_found() => {
                debug!("Page doesn't exist");
                None
            }
            Err(e) => return Err(e),
        };
        self.record_rate_limits().await;
        Ok(page)
    }

    async fn update_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
        content: &str,
    ) -> Result<(), CoreError> {
        debug!(
            "Updating subreddit wiki page: {} : {} : {}",
            subreddit_name,
            page_name,
            content.len()
        );
        if self.no_post {
            info!("{}", content);
            return Ok(());
        }

        self.api
            .edit_wiki_page(subreddit_name, page_name, content, None)
            .await?;
        self.record_rate_limits().await;
        Ok(())
    }

    async fn get_keyword_comments(
        &mut self,
        keyword: &str,
        last_seen: DateTime<Utc>,
    ) -> Vec<SearchComment> {
        self.search.get_keyword_comments(keyword, last_seen).await
    }

    fn mark_keyword_comment_processed(&mut self, comment_id: &str) {
        self.search.mark_processed(comment_id);
    }

    async fn get_effective_lag(&mut self) -> i64 {
        self.search.effective_lag().await
    }
}
