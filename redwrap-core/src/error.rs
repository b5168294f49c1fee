use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Ingest store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

/// One entry of the `json.errors` array Reddit returns for `api_type=json` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorItem {
    pub error_type: String,
    pub message: String,
    pub field: Option<String>,
}

impl fmt::Display for ApiErrorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: '{}' on field '{}'", self.error_type, self.message, field),
            None => write!(f, "{}: '{}'", self.error_type, self.message),
        }
    }
}

/// Failures at the Reddit HTTP boundary. Status codes with a meaning for
/// callers get their own variant; `Api` carries the error identifiers of a
/// 200 response.
#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Token exchange failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("{}", format_items(.items))]
    Api { items: Vec<ApiErrorItem> },

    #[error("Too many requests, window resets in {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden: {resource}")]
    Forbidden { resource: String },

    #[error("Quarantined: {resource}")]
    Quarantined { resource: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Redirected from {resource} to {location}")]
    Redirect { resource: String, location: String },

    #[error("Bad request: {resource}")]
    BadRequest { resource: String },

    #[error("Access token rejected")]
    InvalidToken,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unexpected response: {details}")]
    InvalidResponse { details: String },

    #[error("Reddit returned {status_code}")]
    ServerError { status_code: u16 },
}

impl RedditApiError {
    /// Error identifier of the first reported item, the one outcome mapping keys on.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            RedditApiError::Api { items } => items.first().map(|item| item.error_type.as_str()),
            _ => None,
        }
    }
}

fn format_items(items: &[ApiErrorItem]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Could not open {reason}")]
    ConnectionFailed { reason: String },

    #[error("Duplicate row: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Backup failed: {reason}")]
    BackupFailed { reason: String },

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// `praw.ini` lookup failures. Messages name the section and key so a
/// misconfigured account is easy to fix.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find config")]
    NoConfigDirectory,

    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Could not parse {path}: {details}")]
    InvalidFormat { path: String, details: String },

    #[error("Section {section} not in config")]
    MissingSection { section: String },

    #[error("Variable {field} not in section {section}")]
    MissingField { section: String, field: String },
}
