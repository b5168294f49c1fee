use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redwrap_core::{Comment, CoreError, Message, ReturnType, SearchComment, Submission, Thing};

/// Newest submissions fetched by [`RedditApi::get_subreddit_submissions`].
pub const SUBREDDIT_SUBMISSION_LIMIT: usize = 1000;

/// Default inbox page size for [`RedditApi::get_messages`].
pub const DEFAULT_MESSAGE_COUNT: usize = 500;

/// Everything application code may ask of Reddit.
///
/// Implemented by the network-backed [`crate::Reddit`] and the in-memory
/// [`crate::FakeReddit`]. Mutating calls report expected failures as a
/// [`ReturnType`]; an `Err` is reserved for failures callers cannot act on.
#[async_trait]
pub trait RedditApi: Send {
    fn username(&self) -> &str;

    async fn get_messages(&mut self, count: usize) -> Result<Vec<Message>, CoreError>;

    async fn reply_message(
        &mut self,
        message: &Message,
        body: &str,
        retry_seconds: u64,
    ) -> Result<ReturnType, CoreError>;

    async fn mark_read(&mut self, message: &Message) -> Result<ReturnType, CoreError>;

    async fn get_submission(&mut self, submission_id: &str)
        -> Result<Option<Submission>, CoreError>;

    async fn get_comment(&mut self, comment_id: &str) -> Result<Option<Comment>, CoreError>;

    async fn subreddit_exists(&mut self, subreddit_name: &str) -> Result<bool, CoreError>;

    async fn redditor_exists(&mut self, redditor_name: &str) -> Result<bool, CoreError>;

    async fn edit_comment(&mut self, comment_id: &str, body: &str)
        -> Result<ReturnType, CoreError>;

    async fn delete_comment(&mut self, comment_id: &str) -> Result<ReturnType, CoreError>;

    async fn send_message(
        &mut self,
        user_name: &str,
        subject: &str,
        body: &str,
        retry_seconds: u64,
    ) -> Result<ReturnType, CoreError>;

    /// Returns the new comment's id alongside the outcome.
    async fn reply_comment(
        &mut self,
        comment: &Comment,
        body: &str,
        retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError>;

    /// Returns the new comment's id alongside the outcome.
    async fn reply_submission(
        &mut self,
        submission: &Submission,
        body: &str,
        retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError>;

    /// Newest first. `subreddit_name` may join several names with `+`.
    async fn get_subreddit_submissions(
        &mut self,
        subreddit_name: &str,
    ) -> Result<Vec<Submission>, CoreError>;

    async fn quarantine_opt_in(&mut self, subreddit_name: &str) -> bool;

    async fn get_user_creation_date(&mut self, user_name: &str) -> Option<DateTime<Utc>>;

    async fn call_info(&mut self, fullnames: &[String]) -> Result<Vec<Thing>, CoreError>;

    async fn get_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
    ) -> Result<Option<String>, CoreError>;

    async fn update_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
        content: &str,
    ) -> Result<(), CoreError>;

    /// Comments mentioning `keyword` created after `last_seen` that have not
    /// been marked processed yet, newest first.
    async fn get_keyword_comments(
        &mut self,
        keyword: &str,
        last_seen: DateTime<Utc>,
    ) -> Vec<SearchComment>;

    fn mark_keyword_comment_processed(&mut self, comment_id: &str);

    /// Seconds the keyword search currently trails behind live Reddit.
    async fn get_effective_lag(&mut self) -> i64;
}
