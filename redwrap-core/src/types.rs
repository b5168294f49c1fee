use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Id returned by dry-run replies and accepted by the getters as "no real object".
pub const PLACEHOLDER_ID: &str = "xxxxxx";

static FULLNAME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"t\d_").expect("valid fullname regex"));

/// Strips every `t<N>_` type prefix, turning `t1_abc123` into `abc123`.
pub fn id_from_fullname(fullname: &str) -> String {
    FULLNAME_PREFIX.replace_all(fullname, "").into_owned()
}

/// Result of a mutating API call.
///
/// Callers branch on exact variants, so the set is closed and stable. Every
/// variant except `Success` and `NothingReturned` corresponds to an error
/// identifier Reddit reports in `json.errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnType {
    Success,
    InvalidUser,
    UserDoesntExist,
    Forbidden,
    ThreadLocked,
    DeletedComment,
    Quarantined,
    Ratelimit,
    ThreadReplied,
    NothingReturned,
    SubredditNotEnabled,
    SubmissionNotProcessed,
    NotWhitelistedByUserMessage,
    PmModeratorRestriction,
    SubredditOutboundLinkingDisallowed,
    SubredditLinkingDisallowed,
    CommentUnrepliable,
    SomethingIsBroken,
    CommentGuidanceValidationFailed,
}

impl ReturnType {
    pub const ALL: [ReturnType; 19] = [
        ReturnType::Success,
        ReturnType::InvalidUser,
        ReturnType::UserDoesntExist,
        ReturnType::Forbidden,
        ReturnType::ThreadLocked,
        ReturnType::DeletedComment,
        ReturnType::Quarantined,
        ReturnType::Ratelimit,
        ReturnType::ThreadReplied,
        ReturnType::NothingReturned,
        ReturnType::SubredditNotEnabled,
        ReturnType::SubmissionNotProcessed,
        ReturnType::NotWhitelistedByUserMessage,
        ReturnType::PmModeratorRestriction,
        ReturnType::SubredditOutboundLinkingDisallowed,
        ReturnType::SubredditLinkingDisallowed,
        ReturnType::CommentUnrepliable,
        ReturnType::SomethingIsBroken,
        ReturnType::CommentGuidanceValidationFailed,
    ];

    /// Wire name, identical to the identifier Reddit uses for the error.
    pub fn name(&self) -> &'static str {
        match self {
            ReturnType::Success => "SUCCESS",
            ReturnType::InvalidUser => "INVALID_USER",
            ReturnType::UserDoesntExist => "USER_DOESNT_EXIST",
            ReturnType::Forbidden => "FORBIDDEN",
            ReturnType::ThreadLocked => "THREAD_LOCKED",
            ReturnType::DeletedComment => "DELETED_COMMENT",
            ReturnType::Quarantined => "QUARANTINED",
            ReturnType::Ratelimit => "RATELIMIT",
            ReturnType::ThreadReplied => "THREAD_REPLIED",
            ReturnType::NothingReturned => "NOTHING_RETURNED",
            ReturnType::SubredditNotEnabled => "SUBREDDIT_NOT_ENABLED",
            ReturnType::SubmissionNotProcessed => "SUBMISSION_NOT_PROCESSED",
            ReturnType::NotWhitelistedByUserMessage => "NOT_WHITELISTED_BY_USER_MESSAGE",
            ReturnType::PmModeratorRestriction => "PM_MODERATOR_RESTRICTION",
            ReturnType::SubredditOutboundLinkingDisallowed => {
                "SUBREDDIT_OUTBOUND_LINKING_DISALLOWED"
            }
            ReturnType::SubredditLinkingDisallowed => "SUBREDDIT_LINKING_DISALLOWED",
            ReturnType::CommentUnrepliable => "COMMENT_UNREPLIABLE",
            ReturnType::SomethingIsBroken => "SOMETHING_IS_BROKEN",
            ReturnType::CommentGuidanceValidationFailed => "COMMENT_GUIDANCE_VALIDATION_FAILED",
        }
    }

    /// Exact match of a Reddit error identifier. `None` means the identifier is
    /// unknown and the caller must treat the error as fatal.
    pub fn from_error_type(error_type: &str) -> Option<ReturnType> {
        Self::ALL
            .iter()
            .copied()
            .find(|return_type| return_type.name() == error_type)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReturnType::Success)
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reddit "thing" type, the `tN` part of a fullname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThingKind {
    Comment,
    Account,
    Link,
    Message,
    Subreddit,
}

impl ThingKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ThingKind::Comment => "t1",
            ThingKind::Account => "t2",
            ThingKind::Link => "t3",
            ThingKind::Message => "t4",
            ThingKind::Subreddit => "t5",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<ThingKind> {
        match prefix {
            "t1" => Some(ThingKind::Comment),
            "t2" => Some(ThingKind::Account),
            "t3" => Some(ThingKind::Link),
            "t4" => Some(ThingKind::Message),
            "t5" => Some(ThingKind::Subreddit),
            _ => None,
        }
    }

    pub fn fullname(&self, id: &str) -> String {
        format!("{}_{}", self.prefix(), id)
    }
}

/// An inbox item. Comment replies and username mentions arrive in the inbox
/// too, in which case `kind` is `ThingKind::Comment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: ThingKind,
    pub author: Option<String>,
    pub dest: Option<String>,
    pub subject: String,
    pub body: String,
    pub created_utc: DateTime<Utc>,
    pub parent_id: Option<String>,
    pub subreddit: Option<String>,
}

impl Message {
    pub fn fullname(&self) -> String {
        self.kind.fullname(&self.id)
    }

    pub fn is_comment(&self) -> bool {
        self.kind == ThingKind::Comment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub body: String,
    pub created_utc: DateTime<Utc>,
    pub permalink: Option<String>,
    pub link_id: Option<String>,
    pub parent_id: Option<String>,
}

impl Comment {
    pub fn fullname(&self) -> String {
        ThingKind::Comment.fullname(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub selftext: String,
    pub created_utc: DateTime<Utc>,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub locked: bool,
    pub link_flair_text: Option<String>,
    pub removed_by_category: Option<String>,
}

impl Submission {
    pub fn fullname(&self) -> String {
        ThingKind::Link.fullname(&self.id)
    }
}

/// Heterogeneous item returned by batch lookups by fullname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Thing {
    Comment(Comment),
    Submission(Submission),
}

impl Thing {
    pub fn id(&self) -> &str {
        match self {
            Thing::Comment(comment) => &comment.id,
            Thing::Submission(submission) => &submission.id,
        }
    }

    pub fn fullname(&self) -> String {
        match self {
            Thing::Comment(comment) => comment.fullname(),
            Thing::Submission(submission) => submission.fullname(),
        }
    }
}

/// Raw comment record returned by a search mirror. Only `id` and
/// `created_utc` are guaranteed; everything else the mirror sends is kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchComment {
    pub id: String,
    #[serde(deserialize_with = "deserialize_epoch")]
    pub created_utc: i64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub link_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SearchComment {
    pub fn created(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created_utc, 0).unwrap_or_default()
    }
}

// Mirrors disagree on whether timestamps are integers or floats.
fn deserialize_epoch<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value as i64)
}

/// Converts Reddit's float epoch seconds into a UTC timestamp.
pub fn timestamp_from_epoch(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds as i64, 0).unwrap_or_default()
}
