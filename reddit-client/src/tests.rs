#[cfg(test)]
mod tests {
    use crate::{RedditApi, RedditApiClient, Reddit, SearchClient};
    use chrono::{TimeZone, Utc};
    use redwrap_core::{Comment, Message, ReturnType, ThingKind};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOT: &str = "test_bot";

    async fn connect(server: &MockServer, no_post: bool) -> Reddit {
        Mock::given(method("GET"))
            .and(path("/api/v1/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "name": BOT, "created_utc": 1_400_000_000.0 }))
                    .insert_header("x-ratelimit-remaining", "595.0")
                    .insert_header("x-ratelimit-used", "5")
                    .insert_header("x-ratelimit-reset", "300"),
            )
            .mount(server)
            .await;

        let api = RedditApiClient::with_access_token(
            "test_token".to_string(),
            "redwrap-tests/0.1".to_string(),
        )
        .unwrap()
        .with_base_url(server.uri());
        let search = SearchClient::with_endpoints(
            "redwrap-tests/0.1",
            &format!("{}/primary", server.uri()),
            &format!("{}/beta", server.uri()),
        )
        .unwrap();

        Reddit::from_parts(api, search, no_post).await.unwrap()
    }

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            author: Some("someone".to_string()),
            subreddit: Some("rust".to_string()),
            body: "a comment".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            permalink: Some(format!("/r/rust/comments/p1/_/{id}/")),
            link_id: Some("t3_p1".to_string()),
            parent_id: Some("t3_p1".to_string()),
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            kind: ThingKind::Message,
            author: Some("someone".to_string()),
            dest: Some(BOT.to_string()),
            subject: "hello".to_string(),
            body: "ping".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            parent_id: None,
            subreddit: None,
        }
    }

    fn api_error_body(error_type: &str, message: &str) -> serde_json::Value {
        json!({ "json": { "errors": [[error_type, message, "parent"]] } })
    }

    #[tokio::test]
    async fn test_connect_resolves_username_and_rate_limits() {
        let server = MockServer::start().await;
        let reddit = connect(&server, false).await;

        assert_eq!(reddit.username(), BOT);
        assert!(!reddit.is_dry_run());

        let gauges = reddit
            .metrics()
            .get_account_rate_limits(BOT)
            .await
            .unwrap();
        assert_eq!(gauges.requests_remaining, 595.0);
        assert_eq!(gauges.requests_used, 5);
        assert!(gauges.seconds_remaining <= 300);
    }

    #[tokio::test]
    async fn test_reply_comment_returns_new_id() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/comment"))
            .and(body_string_contains("thing_id=t1_abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "json": {
                    "errors": [],
                    "data": { "things": [{ "kind": "t1", "data": { "id": "reply1" } }] }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (id, result) = reddit
            .reply_comment(&comment("abc123"), "hello there", 0)
            .await
            .unwrap();
        assert_eq!(result, ReturnType::Success);
        assert_eq!(id.as_deref(), Some("reply1"));
    }

    #[tokio::test]
    async fn test_reply_comment_without_id_is_nothing_returned() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/comment"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "json": { "errors": [], "data": { "things": [] } } })),
            )
            .mount(&server)
            .await;

        let (id, result) = reddit
            .reply_comment(&comment("abc123"), "hello there", 0)
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(result, ReturnType::NothingReturned);
    }

    #[tokio::test]
    async fn test_reply_to_locked_thread() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/comment"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(api_error_body("THREAD_LOCKED", "that thread is locked")),
            )
            .mount(&server)
            .await;

        let (id, result) = reddit
            .reply_comment(&comment("abc123"), "hello there", 0)
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(result, ReturnType::ThreadLocked);
        assert_eq!(
            reddit.metrics().outcome_count(ReturnType::ThreadLocked).await,
            1
        );
    }

    #[tokio::test]
    async fn test_reply_in_banned_subreddit_is_forbidden() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/comment"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "reason": "banned" })))
            .mount(&server)
            .await;

        let (_, result) = reddit
            .reply_comment(&comment("abc123"), "hello there", 0)
            .await
            .unwrap();
        assert_eq!(result, ReturnType::Forbidden);
    }

    #[tokio::test]
    async fn test_dry_run_posts_nothing() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, true).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert!(reddit.is_dry_run());
        let (id, result) = reddit
            .reply_comment(&comment("abc123"), "hello there", 0)
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("xxxxxx"));
        assert_eq!(result, ReturnType::Success);

        assert_eq!(
            reddit
                .reply_message(&message("m1"), "pong", 0)
                .await
                .unwrap(),
            ReturnType::Success
        );
        assert_eq!(
            reddit.edit_comment("abc123", "edited").await.unwrap(),
            ReturnType::Success
        );
        assert_eq!(
            reddit.delete_comment("abc123").await.unwrap(),
            ReturnType::Success
        );
        assert_eq!(
            reddit.mark_read(&message("m1")).await.unwrap(),
            ReturnType::Success
        );
        reddit
            .update_subreddit_wiki_page("rust", "config", "content")
            .await
            .unwrap();
        assert!(reddit.quarantine_opt_in("spicy").await);
    }

    #[tokio::test]
    async fn test_message_to_deleted_user() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/compose"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "json": { "errors": [] } })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            reddit
                .send_message("[deleted]", "subject", "body", 0)
                .await
                .unwrap(),
            ReturnType::InvalidUser
        );
        assert_eq!(
            reddit
                .send_message("friend", "subject", "body", 0)
                .await
                .unwrap(),
            ReturnType::Success
        );
    }

    #[tokio::test]
    async fn test_send_message_to_unknown_user() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/compose"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(api_error_body("USER_DOESNT_EXIST", "that user doesn't exist")),
            )
            .mount(&server)
            .await;

        assert_eq!(
            reddit
                .send_message("ghost", "subject", "body", 0)
                .await
                .unwrap(),
            ReturnType::UserDoesntExist
        );
    }

    #[tokio::test]
    async fn test_subreddit_exists() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/r/rust/about"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "t5", "data": {} })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/missing/about"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/typo/about"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/subreddits/search?q=typo"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/private/about"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "reason": "private" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/spicy/about"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "reason": "quarantined" })),
            )
            .mount(&server)
            .await;

        assert!(reddit.subreddit_exists("rust").await.unwrap());
        assert!(!reddit.subreddit_exists("missing").await.unwrap());
        assert!(!reddit.subreddit_exists("typo").await.unwrap());
        assert!(!reddit.subreddit_exists("private").await.unwrap());
        assert!(!reddit.subreddit_exists("spicy").await.unwrap());
    }

    #[tokio::test]
    async fn test_redditor_lookups() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/user/old_timer/about"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "t2",
                "data": { "name": "old_timer", "created_utc": 1_433_116_800.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/ghost/about"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(reddit.redditor_exists("old_timer").await.unwrap());
        assert!(!reddit.redditor_exists("ghost").await.unwrap());

        assert_eq!(
            reddit.get_user_creation_date("old_timer").await,
            Some(Utc.with_ymd_and_hms(2015, 6, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(reddit.get_user_creation_date("ghost").await, None);
    }

    #[tokio::test]
    async fn test_get_comment_through_info() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/api/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Listing",
                "data": {
                    "after": null,
                    "children": [{
                        "kind": "t1",
                        "data": {
                            "id": "abc123",
                            "author": "someone",
                            "subreddit": "rust",
                            "body": "found it",
                            "created_utc": 1_704_067_200.0,
                            "permalink": "/r/rust/comments/p1/_/abc123/",
                            "link_id": "t3_p1",
                            "parent_id": "t3_p1"
                        }
                    }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        // The placeholder id never reaches the network
        assert!(reddit.get_comment("xxxxxx").await.unwrap().is_none());

        let found = reddit.get_comment("abc123").await.unwrap().unwrap();
        assert_eq!(found.body, "found it");
        assert_eq!(found.link_id.as_deref(), Some("t3_p1"));
    }

    #[tokio::test]
    async fn test_wiki_pages() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/r/rust/wiki/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "wikipage",
                "data": { "content_md": "key: value" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/rust/wiki/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/r/rust/api/wiki/edit"))
            .and(body_string_contains("page=config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            reddit
                .get_subreddit_wiki_page("rust", "config")
                .await
                .unwrap()
                .as_deref(),
            Some("key: value")
        );
        assert!(reddit
            .get_subreddit_wiki_page("rust", "missing")
            .await
            .unwrap()
            .is_none());
        reddit
            .update_subreddit_wiki_page("rust", "config", "key: other")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_quarantine_opt_in() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/quarantine_optin"))
            .and(body_string_contains("sr_name=spicy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/quarantine_optin"))
            .and(body_string_contains("sr_name=banned"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(reddit.quarantine_opt_in("spicy").await);
        assert!(!reddit.quarantine_opt_in("banned").await);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_reach_metrics() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/message/unread"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "kind": "Listing",
                        "data": {
                            "after": null,
                            "children": [{
                                "kind": "t4",
                                "data": {
                                    "id": "m1",
                                    "author": "someone",
                                    "dest": BOT,
                                    "subject": "hello",
                                    "body": "ping",
                                    "created_utc": 1_704_067_200.0
                                }
                            }]
                        }
                    }))
                    .insert_header("x-ratelimit-remaining", "42.0")
                    .insert_header("x-ratelimit-used", "558")
                    .insert_header("x-ratelimit-reset", "120"),
            )
            .mount(&server)
            .await;

        let messages = reddit.get_messages(10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, ThingKind::Message);
        assert_eq!(messages[0].subject, "hello");

        let metrics = reddit.metrics();
        let gauges = metrics.get_account_rate_limits(BOT).await.unwrap();
        assert_eq!(gauges.requests_remaining, 42.0);
        assert_eq!(gauges.requests_used, 558);

        let endpoint = metrics.get_endpoint_metrics("/message/unread").await.unwrap();
        assert_eq!(endpoint.request_count, 1);
        assert_eq!(endpoint.last_status_code, Some(200));
        assert_eq!(metrics.get_metrics().await.total_requests, 2);
    }

    fn unread_page(ids: std::ops::Range<usize>, after: Option<&str>) -> serde_json::Value {
        let children: Vec<serde_json::Value> = ids
            .map(|i| {
                json!({
                    "kind": "t4",
                    "data": {
                        "id": format!("m{i:03}"),
                        "author": "someone",
                        "dest": BOT,
                        "subject": "hello",
                        "body": "ping",
                        "created_utc": 1_700_000_000.0,
                        "parent_id": null,
                        "subreddit": null
                    }
                })
            })
            .collect();
        json!({
            "kind": "Listing",
            "data": { "children": children, "after": after, "before": null }
        })
    }

    #[tokio::test]
    async fn test_get_messages_follows_after_cursor() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/message/unread"))
            .and(query_param("after", "t4_m099"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(unread_page(100..150, None)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/message/unread"))
            .and(query_param("limit", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(unread_page(0..100, Some("t4_m099"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let messages = reddit.get_messages(500).await.unwrap();
        assert_eq!(messages.len(), 150);
        assert_eq!(messages[0].id, "m000");
        assert_eq!(messages[149].id, "m149");
    }

    #[tokio::test]
    async fn test_get_messages_stops_at_count() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("GET"))
            .and(path("/message/unread"))
            .and(query_param("limit", "20"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(unread_page(0..20, Some("t4_m019"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let messages = reddit.get_messages(20).await.unwrap();
        assert_eq!(messages.len(), 20);
    }

    #[tokio::test]
    async fn test_mark_read_posts_fullname() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/read_message"))
            .and(body_string_contains("id=t4_m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            reddit.mark_read(&message("m1")).await.unwrap(),
            ReturnType::Success
        );
        assert_eq!(reddit.metrics().outcome_count(ReturnType::Success).await, 1);
    }

    // Real clock: a paused clock would fire the HTTP client's timeout while
    // the mock server answers from its own thread.
    #[tokio::test]
    async fn test_send_message_waits_out_ratelimit() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/compose"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_error_body(
                "RATELIMIT",
                "you are doing that too much. try again in 1 second.",
            )))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/compose"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "json": { "errors": [] } })))
            .expect(1)
            .mount(&server)
            .await;

        let start = std::time::Instant::now();
        assert_eq!(
            reddit
                .send_message("friend", "subject", "body", 30)
                .await
                .unwrap(),
            ReturnType::Success
        );
        assert!(start.elapsed() >= Duration::from_secs(1));

        let metrics = reddit.metrics();
        let gauges = metrics.get_account_rate_limits(BOT).await.unwrap();
        assert_eq!(gauges.ratelimit_slept_seconds, 1);
        assert_eq!(metrics.outcome_count(ReturnType::Success).await, 1);
        assert_eq!(metrics.outcome_count(ReturnType::Ratelimit).await, 0);
    }

    #[tokio::test]
    async fn test_send_message_ratelimit_over_budget() {
        let server = MockServer::start().await;
        let mut reddit = connect(&server, false).await;

        Mock::given(method("POST"))
            .and(path("/api/compose"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_error_body(
                "RATELIMIT",
                "you are doing that too much. try again in 9 minutes.",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let result = reddit
            .send_message("friend", "subject", "body", 30)
            .await
            .unwrap();
        assert_eq!(result, ReturnType::Ratelimit);

        let gauges = reddit.metrics().get_account_rate_limits(BOT).await.unwrap();
        assert_eq!(gauges.ratelimit_slept_seconds, 0);
    }
}
