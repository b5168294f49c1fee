//! In-memory [`RedditApi`] for unit tests of code built on the facade.
//!
//! Objects live in an arena keyed by id. Replies are linked both ways through
//! ids: a parent owns the list of its children's ids and each child records
//! its parent's id.

use crate::facade::RedditApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redwrap_core::{
    id_from_fullname, Comment, CoreError, Message, RecencySet, ReturnType, SearchComment,
    Submission, Thing, ThingKind, PLACEHOLDER_ID,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz123456789";

/// Six character id in Reddit's base36 style.
pub fn random_id() -> String {
    (0..6)
        .map(|_| ID_CHARS[fastrand::usize(..ID_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub created_utc: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_utc: None,
        }
    }

    pub fn with_created(mut self, created_utc: DateTime<Utc>) -> Self {
        self.created_utc = Some(created_utc);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subreddit {
    pub display_name: String,
    /// Ids of submissions posted here.
    pub posts: Vec<String>,
    pub is_banned: bool,
}

impl Subreddit {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

/// A message, comment or submission stored in the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RedditObject {
    pub id: String,
    pub kind: ThingKind,
    pub body: Option<String>,
    pub author: Option<String>,
    pub dest: Option<String>,
    pub subreddit: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub permalink: Option<String>,
    pub link_id: Option<String>,
    pub title: Option<String>,
    pub link_flair_text: Option<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl RedditObject {
    pub fn new(kind: ThingKind) -> Self {
        Self {
            id: random_id(),
            kind,
            body: None,
            author: None,
            dest: None,
            subreddit: None,
            created_utc: Utc::now(),
            permalink: None,
            link_id: None,
            title: None,
            link_flair_text: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn with_subreddit(mut self, subreddit: impl Into<String>) -> Self {
        self.subreddit = Some(subreddit.into());
        self
    }

    pub fn with_created(mut self, created_utc: DateTime<Utc>) -> Self {
        self.created_utc = created_utc;
        self
    }

    pub fn with_permalink(mut self, permalink: impl Into<String>) -> Self {
        self.permalink = Some(permalink.into());
        self
    }

    pub fn with_link_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_flair(mut self, flair: impl Into<String>) -> Self {
        self.link_flair_text = Some(flair.into());
        self
    }

    pub fn fullname(&self) -> String {
        self.kind.fullname(&self.id)
    }

    /// Explicit permalink, or one derived from the subreddit and id.
    pub fn permalink(&self) -> Option<String> {
        self.permalink.clone().or_else(|| {
            self.subreddit
                .as_ref()
                .map(|subreddit| format!("/r/{}/comments/{}", subreddit, self.id))
        })
    }

    pub fn url(&self) -> Option<String> {
        self.permalink()
            .map(|permalink| format!("http://www.reddit.com{permalink}"))
    }

    pub fn to_comment(&self) -> Comment {
        Comment {
            id: self.id.clone(),
            author: self.author.clone(),
            subreddit: self.subreddit.clone(),
            body: self.body.clone().unwrap_or_default(),
            created_utc: self.created_utc,
            permalink: self.permalink(),
            link_id: self.link_id.clone(),
            parent_id: None,
        }
    }

    pub fn to_submission(&self) -> Submission {
        Submission {
            id: self.id.clone(),
            author: self.author.clone(),
            subreddit: self.subreddit.clone(),
            title: self.title.clone(),
            selftext: self.body.clone().unwrap_or_default(),
            created_utc: self.created_utc,
            permalink: self.permalink(),
            url: self.url(),
            locked: false,
            link_flair_text: self.link_flair_text.clone(),
            removed_by_category: None,
        }
    }

    pub fn to_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            kind: self.kind,
            author: self.author.clone(),
            dest: self.dest.clone(),
            subject: self.title.clone().unwrap_or_default(),
            body: self.body.clone().unwrap_or_default(),
            created_utc: self.created_utc,
            parent_id: None,
            subreddit: self.subreddit.clone(),
        }
    }

    /// The record a search mirror would return for this comment.
    pub fn to_search_comment(&self) -> SearchComment {
        SearchComment {
            id: self.id.clone(),
            created_utc: self.created_utc.timestamp(),
            author: self.author.clone(),
            subreddit: self.subreddit.clone(),
            permalink: self.permalink(),
            link_id: self.link_id.clone(),
            body: self.body.clone(),
            extra: HashMap::new(),
        }
    }

    #[cfg(feature = "database")]
    pub fn get_ingest_comment(&self, client_id: i64) -> database::IngestComment {
        database::IngestComment::from_search_comment(&self.to_search_comment(), client_id)
    }

    fn from_comment(comment: &Comment) -> Self {
        Self {
            id: comment.id.clone(),
            kind: ThingKind::Comment,
            body: Some(comment.body.clone()),
            author: comment.author.clone(),
            dest: None,
            subreddit: comment.subreddit.clone(),
            created_utc: comment.created_utc,
            permalink: comment.permalink.clone(),
            link_id: comment.link_id.clone(),
            title: None,
            link_flair_text: None,
            parent: None,
            children: Vec::new(),
        }
    }

    fn from_submission(submission: &Submission) -> Self {
        Self {
            id: submission.id.clone(),
            kind: ThingKind::Link,
            body: Some(submission.selftext.clone()),
            author: submission.author.clone(),
            dest: None,
            subreddit: submission.subreddit.clone(),
            created_utc: submission.created_utc,
            permalink: submission.permalink.clone(),
            link_id: None,
            title: submission.title.clone(),
            link_flair_text: submission.link_flair_text.clone(),
            parent: None,
            children: Vec::new(),
        }
    }

    fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            kind: message.kind,
            body: Some(message.body.clone()),
            author: message.author.clone(),
            dest: message.dest.clone(),
            subreddit: message.subreddit.clone(),
            created_utc: message.created_utc,
            permalink: None,
            link_id: None,
            title: Some(message.subject.clone()),
            link_flair_text: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Reddit without a network. Reproduces the outcome codes tests care about:
/// banned subreddits, locked threads and deleted comments.
#[derive(Debug, Default)]
pub struct FakeReddit {
    username: String,
    objects: HashMap<String, RedditObject>,
    unread: Vec<String>,
    sent_messages: Vec<String>,
    self_comments: Vec<String>,
    comments: HashSet<String>,
    submissions: HashSet<String>,
    users: HashMap<String, User>,
    locked_threads: HashSet<String>,
    subreddits: HashMap<String, Subreddit>,
    wiki_pages: HashMap<(String, String), String>,
    processed: RecencySet,
}

impl FakeReddit {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn add_comment(&mut self, comment: RedditObject, self_comment: bool) {
        if self_comment {
            self.self_comments.push(comment.id.clone());
        }
        self.comments.insert(comment.id.clone());
        self.objects.insert(comment.id.clone(), comment);
    }

    /// Stores a submission and lists it under its subreddit.
    pub fn add_submission(&mut self, submission: RedditObject) {
        if let Some(name) = &submission.subreddit {
            self.subreddits
                .entry(name.clone())
                .or_insert_with(|| Subreddit::new(name.clone()))
                .posts
                .push(submission.id.clone());
        }
        self.submissions.insert(submission.id.clone());
        self.objects.insert(submission.id.clone(), submission);
    }

    /// Puts a message in the unread inbox.
    pub fn add_message(&mut self, message: RedditObject) {
        self.unread.push(message.id.clone());
        self.objects.insert(message.id.clone(), message);
    }

    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.name.clone(), user);
    }

    pub fn add_subreddit(&mut self, subreddit: Subreddit) {
        self.subreddits
            .insert(subreddit.display_name.clone(), subreddit);
    }

    pub fn ban_subreddit(&mut self, subreddit_name: &str) {
        self.subreddits
            .entry(subreddit_name.to_string())
            .or_insert_with(|| Subreddit::new(subreddit_name))
            .is_banned = true;
    }

    pub fn lock_thread(&mut self, thread_id: &str) {
        self.locked_threads.insert(thread_id.to_string());
    }

    pub fn set_wiki_page(&mut self, subreddit_name: &str, page_name: &str, content: &str) {
        self.wiki_pages.insert(
            (subreddit_name.to_string(), page_name.to_string()),
            content.to_string(),
        );
    }

    pub fn get_object(&self, id: &str) -> Option<&RedditObject> {
        self.objects.get(id)
    }

    pub fn children(&self, id: &str) -> Vec<&RedditObject> {
        self.objects
            .get(id)
            .map(|object| {
                object
                    .children
                    .iter()
                    .filter_map(|child| self.objects.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_first_child(&self, id: &str) -> Option<&RedditObject> {
        self.children(id).into_iter().next()
    }

    pub fn get_last_child(&self, id: &str) -> Option<&RedditObject> {
        self.children(id).into_iter().last()
    }

    pub fn sent_messages(&self) -> Vec<&RedditObject> {
        self.resolve(&self.sent_messages)
    }

    pub fn self_comments(&self) -> Vec<&RedditObject> {
        self.resolve(&self.self_comments)
    }

    fn resolve(&self, ids: &[String]) -> Vec<&RedditObject> {
        ids.iter().filter_map(|id| self.objects.get(id)).collect()
    }

    fn is_banned(&self, subreddit_name: Option<&str>) -> bool {
        subreddit_name
            .and_then(|name| self.subreddits.get(name))
            .is_some_and(|subreddit| subreddit.is_banned)
    }

    /// Adds a reply authored by this account under `parent_id`. Comment
    /// replies inherit the parent's subreddit and thread.
    fn reply_to(&mut self, parent_id: &str, body: &str, kind: ThingKind) -> String {
        let mut reply = RedditObject::new(kind)
            .with_body(body)
            .with_author(self.username.clone());
        reply.parent = Some(parent_id.to_string());

        if let Some(parent) = self.objects.get_mut(parent_id) {
            parent.children.push(reply.id.clone());
            if kind == ThingKind::Comment {
                reply.subreddit = parent.subreddit.clone();
                reply.link_id = match parent.kind {
                    ThingKind::Link => Some(parent.fullname()),
                    _ => parent.link_id.clone(),
                };
            }
        }

        let id = reply.id.clone();
        self.objects.insert(id.clone(), reply);
        id
    }
}

#[async_trait]
impl RedditApi for FakeReddit {
    fn username(&self) -> &str {
        &self.username
    }

    async fn get_messages(&mut self, count: usize) -> Result<Vec<Message>, CoreError> {
        Ok(self
            .unread
            .iter()
            .take(count)
            .filter_map(|id| self.objects.get(id))
            .map(RedditObject::to_message)
            .collect())
    }

    async fn reply_message(
        &mut self,
        message: &Message,
        body: &str,
        _retry_seconds: u64,
    ) -> Result<ReturnType, CoreError> {
        self.objects
            .entry(message.id.clone())
            .or_insert_with(|| RedditObject::from_message(message));

        let reply_id = self.reply_to(&message.id, body, ThingKind::Message);
        self.sent_messages.push(reply_id);
        Ok(ReturnType::Success)
    }

    async fn mark_read(&mut self, message: &Message) -> Result<ReturnType, CoreError> {
        self.unread.retain(|id| id != &message.id);
        Ok(ReturnType::Success)
    }

    async fn get_submission(
        &mut self,
        submission_id: &str,
    ) -> Result<Option<Submission>, CoreError> {
        if !self.submissions.contains(submission_id) {
            return Ok(None);
        }
        Ok(self
            .objects
            .get(submission_id)
            .map(RedditObject::to_submission))
    }

    async fn get_comment(&mut self, comment_id: &str) -> Result<Option<Comment>, CoreError> {
        if comment_id == PLACEHOLDER_ID {
            return Ok(None);
        }
        let comment = match self.objects.get(comment_id) {
            Some(object) if self.comments.contains(comment_id) => object.to_comment(),
            _ => RedditObject::new(ThingKind::Comment)
                .with_id(comment_id)
                .to_comment(),
        };
        Ok(Some(comment))
    }

    async fn subreddit_exists(&mut self, _subreddit_name: &str) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn redditor_exists(&mut self, _redditor_name: &str) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn edit_comment(
        &mut self,
        comment_id: &str,
        body: &str,
    ) -> Result<ReturnType, CoreError> {
        if let Some(comment) = self.objects.get_mut(comment_id) {
            comment.body = Some(body.to_string());
        }
        Ok(ReturnType::Success)
    }

    async fn delete_comment(&mut self, comment_id: &str) -> Result<ReturnType, CoreError> {
        self.comments.remove(comment_id);
        self.self_comments.retain(|id| id != comment_id);

        let (parent, children) = match self.objects.get(comment_id) {
            Some(comment) => (comment.parent.clone(), comment.children.clone()),
            None => return Ok(ReturnType::Success),
        };

        if let Some(parent) = parent.and_then(|id| self.objects.get_mut(&id)) {
            parent.children.retain(|id| id != comment_id);
        }
        for child in children {
            if let Some(child) = self.objects.get_mut(&child) {
                child.parent = None;
            }
        }
        if let Some(comment) = self.objects.get_mut(comment_id) {
            comment.parent = None;
        }
        Ok(ReturnType::Success)
    }

    async fn send_message(
        &mut self,
        user_name: &str,
        subject: &str,
        body: &str,
        _retry_seconds: u64,
    ) -> Result<ReturnType, CoreError> {
        if user_name == "[deleted]" {
            return Ok(ReturnType::InvalidUser);
        }

        let message = RedditObject::new(ThingKind::Message)
            .with_body(body)
            .with_title(subject)
            .with_author(self.username.clone())
            .with_dest(user_name);
        self.sent_messages.push(message.id.clone());
        self.objects.insert(message.id.clone(), message);
        Ok(ReturnType::Success)
    }

    async fn reply_comment(
        &mut self,
        comment: &Comment,
        body: &str,
        _retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError> {
        let stored = self.objects.get(&comment.id);
        let subreddit = stored
            .and_then(|object| object.subreddit.clone())
            .or_else(|| comment.subreddit.clone());
        let link_id = stored
            .and_then(|object| object.link_id.clone())
            .or_else(|| comment.link_id.clone());

        if self.is_banned(subreddit.as_deref()) {
            return Ok((None, ReturnType::Forbidden));
        }
        if link_id.is_some_and(|link_id| self.locked_threads.contains(&id_from_fullname(&link_id)))
        {
            return Ok((None, ReturnType::ThreadLocked));
        }
        if !self.comments.contains(&comment.id) {
            return Ok((None, ReturnType::DeletedComment));
        }

        let reply_id = self.reply_to(&comment.id, body, ThingKind::Comment);
        self.comments.insert(reply_id.clone());
        self.self_comments.push(reply_id.clone());
        Ok((Some(reply_id), ReturnType::Success))
    }

    async fn reply_submission(
        &mut self,
        submission: &Submission,
        body: &str,
        _retry_seconds: u64,
    ) -> Result<(Option<String>, ReturnType), CoreError> {
        self.objects
            .entry(submission.id.clone())
            .or_insert_with(|| RedditObject::from_submission(submission));

        let reply_id = self.reply_to(&submission.id, body, ThingKind::Comment);
        self.comments.insert(reply_id.clone());
        self.self_comments.push(reply_id.clone());
        Ok((Some(reply_id), ReturnType::Success))
    }

    async fn get_subreddit_submissions(
        &mut self,
        subreddit_name: &str,
    ) -> Result<Vec<Submission>, CoreError> {
        let mut posts: Vec<&RedditObject> = subreddit_name
            .split('+')
            .filter_map(|name| self.subreddits.get(name))
            .flat_map(|subreddit| subreddit.posts.iter())
            .filter_map(|id| self.objects.get(id))
            .collect();
        posts.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(posts.into_iter().map(RedditObject::to_submission).collect())
    }

    async fn quarantine_opt_in(&mut self, _subreddit_name: &str) -> bool {
        true
    }

    async fn get_user_creation_date(&mut self, user_name: &str) -> Option<DateTime<Utc>> {
        self.users.get(user_name).and_then(|user| user.created_utc)
    }

    async fn call_info(&mut self, fullnames: &[String]) -> Result<Vec<Thing>, CoreError> {
        let mut things = Vec::new();
        for fullname in fullnames {
            let Some((prefix, id)) = fullname.split_once('_') else {
                continue;
            };
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            match ThingKind::from_prefix(prefix) {
                Some(ThingKind::Comment) if self.comments.contains(id) => {
                    things.push(Thing::Comment(object.to_comment()));
                }
                Some(ThingKind::Link) if self.submissions.contains(id) => {
                    things.push(Thing::Submission(object.to_submission()));
                }
                _ => debug!("Fake info lookup skipped {}", fullname),
            }
        }
        Ok(things)
    }

    async fn get_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
    ) -> Result<Option<String>, CoreError> {
        Ok(self
            .wiki_pages
            .get(&(subreddit_name.to_string(), page_name.to_string()))
            .cloned())
    }

    async fn update_subreddit_wiki_page(
        &mut self,
        subreddit_name: &str,
        page_name: &str,
        content: &str,
    ) -> Result<(), CoreError> {
        self.set_wiki_page(subreddit_name, page_name, content);
        Ok(())
    }

    async fn get_keyword_comments(
        &mut self,
        keyword: &str,
        last_seen: DateTime<Utc>,
    ) -> Vec<SearchComment> {
        // Cold start skips the boundary second, as the live search does
        let last_seen = if self.processed.is_empty() {
            last_seen + chrono::Duration::seconds(1)
        } else {
            last_seen
        };
        let keyword = keyword.to_lowercase();
        let mut matches: Vec<&RedditObject> = self
            .comments
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter(|comment| comment.created_utc > last_seen)
            .filter(|comment| !self.processed.contains(&comment.id))
            .filter(|comment| {
                comment
                    .body
                    .as_ref()
                    .is_some_and(|body| body.to_lowercase().contains(&keyword))
            })
            .collect();
        matches.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        matches
            .into_iter()
            .map(RedditObject::to_search_comment)
            .collect()
    }

    fn mark_keyword_comment_processed(&mut self, comment_id: &str) {
        self.processed.put(comment_id);
    }

    async fn get_effective_lag(&mut self) -> i64 {
        0
    }
}
