use crate::error::*;
use tracing::{error, warn};

/// Classification and logging shared by the adapter, the ingest store and the
/// binary.
pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Short stable identifier, attached to log lines as `code`.
    fn error_code(&self) -> String;
    /// The thing asked for does not exist (or no longer does).
    fn is_not_found(&self) -> bool;
    /// Reddit refused the account: banned, private or quarantined.
    fn is_access_denied(&self) -> bool;
    /// An insert collided with a row that is already stored.
    fn is_duplicate(&self) -> bool;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "{}", self);
        self
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Database(e) => e.error_code(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "JSON".to_string(),
            CoreError::Network(e) if e.is_timeout() => "HTTP_TIMEOUT".to_string(),
            CoreError::Network(_) => "HTTP".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
        }
    }

    fn is_not_found(&self) -> bool {
        matches!(self, CoreError::RedditApi(e) if e.is_not_found())
    }

    fn is_access_denied(&self) -> bool {
        matches!(self, CoreError::RedditApi(e) if e.is_access_denied())
    }

    fn is_duplicate(&self) -> bool {
        matches!(self, CoreError::Database(e) if e.is_duplicate())
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "{}", self);
        self
    }

    fn error_code(&self) -> String {
        let code = match self {
            RedditApiError::Api { items } => {
                return match items.first() {
                    Some(item) => format!("REDDIT_{}", item.error_type),
                    None => "REDDIT_API".to_string(),
                };
            }
            RedditApiError::AuthenticationFailed { .. } => "AUTH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "TOO_MANY_REQUESTS",
            RedditApiError::Forbidden { .. } => "FORBIDDEN",
            RedditApiError::Quarantined { .. } => "QUARANTINED",
            RedditApiError::NotFound { .. } => "NOT_FOUND",
            RedditApiError::Redirect { .. } => "REDIRECT",
            RedditApiError::BadRequest { .. } => "BAD_REQUEST",
            RedditApiError::InvalidToken => "INVALID_TOKEN",
            RedditApiError::RequestTimeout => "TIMEOUT",
            RedditApiError::InvalidResponse { .. } => "INVALID_RESPONSE",
            RedditApiError::ServerError { .. } => "SERVER_ERROR",
        };
        format!("REDDIT_{code}")
    }

    fn is_not_found(&self) -> bool {
        matches!(self, RedditApiError::NotFound { .. })
    }

    fn is_access_denied(&self) -> bool {
        matches!(
            self,
            RedditApiError::Forbidden { .. } | RedditApiError::Quarantined { .. }
        )
    }

    fn is_duplicate(&self) -> bool {
        false
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "{}", self);
        self
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_OPEN",
            DatabaseError::ConstraintViolation { .. } => "DB_DUPLICATE",
            DatabaseError::BackupFailed { .. } => "DB_BACKUP",
            DatabaseError::Sql(_) => "DB_SQL",
        }
        .to_string()
    }

    fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::Sql(sqlx::Error::RowNotFound))
    }

    fn is_access_denied(&self) -> bool {
        false
    }

    fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::ConstraintViolation { .. })
    }
}
