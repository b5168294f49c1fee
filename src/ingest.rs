use chrono::{DateTime, Duration, Utc};
use database::{IngestComment, IngestDatabase};
use reddit_client::RedditApi;
use redwrap_core::{CoreError, ErrorExt};
use tracing::{debug, info};

/// How far back a search term looks the first time it is polled.
pub const INITIAL_LOOKBACK_HOURS: i64 = 24;

fn last_seen_key(client_id: i64, search_term: &str) -> String {
    format!("last_seen:{client_id}:{search_term}")
}

async fn load_last_seen(
    db: &IngestDatabase,
    client_id: i64,
    search_term: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, CoreError> {
    let stored = db
        .get_keystore(&last_seen_key(client_id, search_term))
        .await?
        .and_then(|value| value.parse::<i64>().ok())
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0));
    Ok(stored.unwrap_or(now - Duration::hours(INITIAL_LOOKBACK_HOURS)))
}

/// Runs every registered search once and stores the new matches. Returns the
/// number of comments added.
pub async fn poll_searches<R: RedditApi + ?Sized>(
    reddit: &mut R,
    db: &IngestDatabase,
    now: DateTime<Utc>,
) -> Result<usize, CoreError> {
    let searches = db.get_all_searches().await?;
    let mut added = 0;

    for (client_id, search_terms) in searches {
        for search_term in search_terms {
            let last_seen = load_last_seen(db, client_id, &search_term, now).await?;
            let comments = reddit.get_keyword_comments(&search_term, last_seen).await;
            debug!(
                "Search {} : {} found {} comments",
                client_id,
                search_term,
                comments.len()
            );

            let mut newest = last_seen.timestamp();
            for comment in &comments {
                match db
                    .add_comment(&IngestComment::from_search_comment(comment, client_id))
                    .await
                {
                    Ok(()) => added += 1,
                    Err(e) if e.is_duplicate() => {
                        debug!("Comment already stored: {}", comment.id);
                    }
                    Err(e) => return Err(e),
                }
                reddit.mark_keyword_comment_processed(&comment.id);
                newest = newest.max(comment.created_utc);
            }

            db.save_keystore(
                &last_seen_key(client_id, &search_term),
                &newest.to_string(),
            )
            .await?;
        }
    }

    info!(
        "Stored {} new comments, search lag {} seconds",
        added,
        reddit.get_effective_lag().await
    );
    Ok(added)
}
