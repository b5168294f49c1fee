use redwrap_core::{ApiErrorItem, ConfigError, CoreError, DatabaseError, ErrorExt, RedditApiError};

fn api_error(error_type: &str) -> RedditApiError {
    RedditApiError::Api {
        items: vec![ApiErrorItem {
            error_type: error_type.to_string(),
            message: "that is not allowed".to_string(),
            field: Some("parent".to_string()),
        }],
    }
}

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_INVALID_TOKEN");

    let api = CoreError::RedditApi(api_error("THREAD_LOCKED"));
    assert_eq!(api.error_code(), "REDDIT_THREAD_LOCKED");

    let db_error = CoreError::Database(DatabaseError::BackupFailed {
        reason: "disk full".to_string(),
    });
    assert_eq!(db_error.error_code(), "DB_BACKUP");

    let config_error = CoreError::Config(ConfigError::MissingField {
        section: "bot".to_string(),
        field: "client_id".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_api_error_type_and_message() {
    let error = api_error("DELETED_COMMENT");
    assert_eq!(error.error_type(), Some("DELETED_COMMENT"));
    assert!(error.to_string().contains("DELETED_COMMENT"));
    assert!(error.to_string().contains("field 'parent'"));

    assert_eq!(RedditApiError::InvalidToken.error_type(), None);
}

#[test]
fn test_classification() {
    let missing: CoreError = RedditApiError::NotFound {
        resource: "/r/nope/about".to_string(),
    }
    .into();
    assert!(missing.is_not_found());
    assert!(!missing.is_access_denied());

    let quarantined: CoreError = RedditApiError::Quarantined {
        resource: "/r/spicy/about".to_string(),
    }
    .into();
    assert!(quarantined.is_access_denied());

    let duplicate: CoreError = DatabaseError::ConstraintViolation {
        constraint: "ingest_comments (abc, 1)".to_string(),
    }
    .into();
    assert!(duplicate.is_duplicate());
    assert!(!duplicate.is_not_found());

    let redirect: CoreError = RedditApiError::Redirect {
        resource: "/r/typo/about".to_string(),
        location: "/subreddits/search".to_string(),
    }
    .into();
    assert!(!redirect.is_not_found());
    assert!(!redirect.is_duplicate());
}

#[test]
fn test_config_messages() {
    let error = ConfigError::MissingSection {
        section: "bot".to_string(),
    };
    assert_eq!(error.to_string(), "Section bot not in config");

    let error = ConfigError::MissingField {
        section: "bot".to_string(),
        field: "refresh_token".to_string(),
    };
    assert_eq!(error.to_string(), "Variable refresh_token not in section bot");
}

#[test]
fn test_logging_returns_self() {
    let error = CoreError::RedditApi(RedditApiError::ServerError { status_code: 503 });
    assert_eq!(error.log_warn().error_code(), "REDDIT_SERVER_ERROR");
    assert_eq!(error.log_error().error_code(), "REDDIT_SERVER_ERROR");
}
