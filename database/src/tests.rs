#[cfg(test)]
mod tests {
    use crate::{backup_file_name, IngestComment, IngestDatabase};
    use chrono::{TimeZone, Utc};
    use redwrap_core::{CoreError, DatabaseError, SearchComment};
    use std::collections::HashMap;
    use std::env;
    use std::path::PathBuf;

    fn temp_db_path() -> PathBuf {
        env::temp_dir().join(format!("test_redwrap_{}.db", uuid::Uuid::new_v4()))
    }

    async fn setup_test_db() -> IngestDatabase {
        IngestDatabase::new(temp_db_path(), None)
            .await
            .expect("Failed to open test database")
    }

    fn sample_comment(id: &str, client_id: i64, created_utc: i64) -> IngestComment {
        IngestComment {
            id: id.to_string(),
            client_id,
            author: "some_user".to_string(),
            subreddit: "rust".to_string(),
            created_utc,
            permalink: format!("/r/rust/comments/abc/_/{id}/"),
            link_id: "t3_abc".to_string(),
            body: "a comment mentioning borrowck".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_or_add_client_is_idempotent() {
        let db = setup_test_db().await;

        let first = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        let second = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "alice");

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let bob = db.get_or_add_client(Some("bob")).await.unwrap().unwrap();
        assert_ne!(bob.id, first.id);
    }

    #[tokio::test]
    async fn test_client_without_name_uses_default() {
        let path = temp_db_path();
        let db = IngestDatabase::new(&path, None).await.unwrap();
        assert!(db.get_or_add_client(None).await.unwrap().is_none());
        let alice = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        db.close().await;

        let db = IngestDatabase::new(&path, Some(alice.id)).await.unwrap();
        let client = db.get_or_add_client(None).await.unwrap().unwrap();
        assert_eq!(client, alice);
    }

    #[tokio::test]
    async fn test_register_and_group_searches() {
        let db = setup_test_db().await;

        db.register_search("tokio", Some("alice")).await.unwrap();
        db.register_search("serde", Some("alice")).await.unwrap();
        db.register_search("tokio", Some("alice")).await.unwrap();
        db.register_search("tokio", Some("bob")).await.unwrap();

        let alice = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        let bob = db.get_or_add_client(Some("bob")).await.unwrap().unwrap();

        let searches = db.get_all_searches().await.unwrap();
        let mut expected = HashMap::new();
        expected.insert(alice.id, vec!["tokio".to_string(), "serde".to_string()]);
        expected.insert(bob.id, vec!["tokio".to_string()]);
        assert_eq!(searches, expected);
    }

    #[tokio::test]
    async fn test_comment_round_trip() {
        let db = setup_test_db().await;
        let client = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();

        let comment = sample_comment("c1", client.id, 1_600_000_000);
        db.add_comment(&comment).await.unwrap();

        let comments = db.get_comments(Some(&client), 100).await.unwrap().unwrap();
        assert_eq!(comments, vec![comment]);
    }

    #[tokio::test]
    async fn test_comments_ordered_oldest_first_and_limited() {
        let db = setup_test_db().await;
        let client = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();

        for (id, created) in [("c3", 300), ("c1", 100), ("c2", 200)] {
            db.add_comment(&sample_comment(id, client.id, created))
                .await
                .unwrap();
        }

        let comments = db.get_comments(Some(&client), 2).await.unwrap().unwrap();
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_same_comment_for_two_clients() {
        let db = setup_test_db().await;
        let alice = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        let bob = db.get_or_add_client(Some("bob")).await.unwrap().unwrap();

        db.add_comment(&sample_comment("c1", alice.id, 100)).await.unwrap();
        db.add_comment(&sample_comment("c1", bob.id, 100)).await.unwrap();

        let duplicate = db.add_comment(&sample_comment("c1", bob.id, 100)).await;
        assert!(matches!(
            duplicate,
            Err(CoreError::Database(DatabaseError::ConstraintViolation { .. }))
        ));

        let alice_comments = db.get_comments(Some(&alice), 100).await.unwrap().unwrap();
        assert_eq!(alice_comments.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_comment() {
        let db = setup_test_db().await;
        let client = db.get_or_add_client(Some("alice")).await.unwrap().unwrap();
        let comment = sample_comment("c1", client.id, 100);

        db.add_comment(&comment).await.unwrap();
        db.delete_comment(&comment).await.unwrap();

        let comments = db.get_comments(Some(&client), 100).await.unwrap().unwrap();
        assert!(comments.is_empty());
    }

    #[tokio::test]
    async fn test_get_comments_without_client() {
        let db = setup_test_db().await;
        assert!(db.get_comments(None, 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keystore_upsert() {
        let db = setup_test_db().await;

        assert_eq!(db.get_keystore("last_seen").await.unwrap(), None);

        db.save_keystore("last_seen", "100").await.unwrap();
        db.save_keystore("last_seen", "200").await.unwrap();
        assert_eq!(
            db.get_keystore("last_seen").await.unwrap(),
            Some("200".to_string())
        );
    }

    #[tokio::test]
    async fn test_backup_copies_file_and_reopens() {
        let mut db = setup_test_db().await;
        db.save_keystore("key", "value").await.unwrap();

        let backup_dir = env::temp_dir().join(format!("redwrap_backup_{}", uuid::Uuid::new_v4()));
        let backup_path = db.backup(&backup_dir).await.unwrap();
        assert!(backup_path.exists());
        assert!(backup_path.starts_with(&backup_dir));

        // The original connection is usable again
        db.save_keystore("after", "backup").await.unwrap();

        let copy = IngestDatabase::new(&backup_path, None).await.unwrap();
        assert_eq!(
            copy.get_keystore("key").await.unwrap(),
            Some("value".to_string())
        );
        assert_eq!(copy.get_keystore("after").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_backup_leaves_store_usable() {
        let mut db = setup_test_db().await;

        // A regular file where the backup folder should be
        let blocker = env::temp_dir().join(format!("redwrap_blocker_{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = db.backup(blocker.join("nested")).await;
        assert!(matches!(
            result,
            Err(CoreError::Database(DatabaseError::BackupFailed { .. }))
        ));

        db.save_keystore("after", "failure").await.unwrap();
        assert_eq!(
            db.get_keystore("after").await.unwrap(),
            Some("failure".to_string())
        );
        std::fs::remove_file(&blocker).unwrap();
    }

    #[tokio::test]
    async fn test_failed_copy_reopens_store() {
        let mut db = setup_test_db().await;
        let backup_dir = env::temp_dir().join(format!("redwrap_backup_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&backup_dir).unwrap();

        // Occupy the destination name with a directory so the copy itself fails
        let destination = backup_dir.join(backup_file_name(Utc::now()));
        std::fs::create_dir_all(&destination).unwrap();

        // Usable afterwards even if the minute rolled over and the copy went through
        let _ = db.backup(&backup_dir).await;
        db.save_keystore("key", "value").await.unwrap();
        assert_eq!(
            db.get_keystore("key").await.unwrap(),
            Some("value".to_string())
        );
        std::fs::remove_dir_all(&backup_dir).unwrap();
    }

    #[test]
    fn test_backup_file_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 59).unwrap();
        assert_eq!(backup_file_name(now), "2024-03-07_09-05.db");
    }

    #[test]
    fn test_ingest_comment_from_search_comment() {
        let raw: SearchComment = serde_json::from_value(serde_json::json!({
            "id": "k1",
            "created_utc": 1_700_000_000,
            "author": "writer",
            "subreddit": "rust",
            "permalink": "/r/rust/comments/p/_/k1/",
            "link_id": "t3_p",
            "body": "ownership!"
        }))
        .unwrap();

        let comment = IngestComment::from_search_comment(&raw, 7);
        assert_eq!(comment.id, "k1");
        assert_eq!(comment.client_id, 7);
        assert_eq!(comment.author, "writer");
        assert_eq!(comment.created_utc, 1_700_000_000);
        assert_eq!(comment.link_id, "t3_p");
        assert_eq!(comment.body, "ownership!");
    }
}
