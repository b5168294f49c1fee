use chrono::{DateTime, Utc};
use redwrap_core::{Comment, CoreError, DatabaseError, SearchComment};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

mod tests;

pub const DEFAULT_LOCATION: &str = "database.db";
pub const DEFAULT_BACKUP_FOLDER: &str = "backup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Search {
    pub id: i64,
    pub client_id: i64,
    pub search_term: String,
}

/// Snapshot of a keyword-matching comment, keyed by (comment id, client id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestComment {
    pub id: String,
    pub client_id: i64,
    pub author: String,
    pub subreddit: String,
    pub created_utc: i64,
    pub permalink: String,
    pub link_id: String,
    pub body: String,
}

impl IngestComment {
    pub fn from_search_comment(comment: &SearchComment, client_id: i64) -> Self {
        Self {
            id: comment.id.clone(),
            client_id,
            author: comment.author.clone().unwrap_or_default(),
            subreddit: comment.subreddit.clone().unwrap_or_default(),
            created_utc: comment.created_utc,
            permalink: comment.permalink.clone().unwrap_or_default(),
            link_id: comment.link_id.clone().unwrap_or_default(),
            body: comment.body.clone().unwrap_or_default(),
        }
    }

    pub fn from_comment(comment: &Comment, client_id: i64) -> Self {
        Self {
            id: comment.id.clone(),
            client_id,
            author: comment.author.clone().unwrap_or_default(),
            subreddit: comment.subreddit.clone().unwrap_or_default(),
            created_utc: comment.created_utc.timestamp(),
            permalink: comment.permalink.clone().unwrap_or_default(),
            link_id: comment.link_id.clone().unwrap_or_default(),
            body: comment.body.clone(),
        }
    }
}

/// SQLite store for clients, their search terms, ingested comments and a
/// small key/value table.
pub struct IngestDatabase {
    pool: SqlitePool,
    location: PathBuf,
    default_client_id: Option<i64>,
}

impl IngestDatabase {
    pub async fn new(
        location: impl AsRef<Path>,
        default_client_id: Option<i64>,
    ) -> Result<Self, CoreError> {
        let location = location.as_ref().to_path_buf();
        let pool = Self::connect(&location).await?;

        let db = Self {
            pool,
            location,
            default_client_id,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn connect(location: &Path) -> Result<SqlitePool, CoreError> {
        debug!("Opening ingest database: {}", location.display());
        let options = SqliteConnectOptions::new()
            .filename(location)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                })
            })
    }

    async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY,
                name VARCHAR(80) NOT NULL,
                CONSTRAINT _clients_name UNIQUE (name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search (
                id INTEGER PRIMARY KEY,
                client_id INTEGER REFERENCES clients (id),
                search_term VARCHAR(80) NOT NULL,
                CONSTRAINT _search_client_term UNIQUE (client_id, search_term)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingest_comments (
                id VARCHAR(12) NOT NULL,
                client_id INTEGER NOT NULL REFERENCES clients (id),
                author VARCHAR(80) NOT NULL,
                subreddit VARCHAR(80) NOT NULL,
                created_utc INTEGER NOT NULL,
                permalink VARCHAR(400) NOT NULL,
                link_id VARCHAR(12) NOT NULL,
                body VARCHAR(10000) NOT NULL,
                PRIMARY KEY (id, client_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS key_value (
                key VARCHAR(32) PRIMARY KEY,
                value VARCHAR(200)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Copies the database file to `<backup_folder>/<YYYY-MM-DD_HH-MM>.db` and
    /// reopens the original. Returns the backup path.
    pub async fn backup(&mut self, backup_folder: impl AsRef<Path>) -> Result<PathBuf, CoreError> {
        let backup_folder = backup_folder.as_ref();
        let destination = backup_folder.join(backup_file_name(Utc::now()));
        let backup_failed = |e: std::io::Error| {
            CoreError::Database(DatabaseError::BackupFailed {
                reason: format!("{} -> {}: {}", self.location.display(), destination.display(), e),
            })
        };

        tokio::fs::create_dir_all(backup_folder)
            .await
            .map_err(backup_failed)?;

        // The pool is reopened whether or not the copy succeeds
        self.close().await;
        let copied = tokio::fs::copy(&self.location, &destination)
            .await
            .map_err(backup_failed);
        self.pool = Self::connect(&self.location).await?;
        self.run_migrations().await?;

        copied?;
        info!("Backed up database to {}", destination.display());
        Ok(destination)
    }

    /// Looks up a client by name, creating it on first use. With no name the
    /// configured default client id is used instead.
    pub async fn get_or_add_client(
        &self,
        client_name: Option<&str>,
    ) -> Result<Option<Client>, CoreError> {
        debug!(
            "Fetching client: {:?} : {:?}",
            client_name, self.default_client_id
        );

        let Some(client_name) = client_name else {
            let Some(default_id) = self.default_client_id else {
                warn!("Client name and id not set in get client");
                return Ok(None);
            };
            let client = self.get_client_by_id(default_id).await?;
            if client.is_none() {
                warn!("Default client {} does not exist", default_id);
            }
            return Ok(client);
        };

        let existing: Option<Client> =
            sqlx::query_as("SELECT id, name FROM clients WHERE name = ?")
                .bind(client_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::Sql)?;
        if let Some(client) = existing {
            return Ok(Some(client));
        }

        debug!("Creating client: {}", client_name);
        let result = sqlx::query("INSERT INTO clients (name) VALUES (?)")
            .bind(client_name)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

        Ok(Some(Client {
            id: result.last_insert_rowid(),
            name: client_name.to_string(),
        }))
    }

    pub async fn get_client_by_id(&self, client_id: i64) -> Result<Option<Client>, CoreError> {
        let client = sqlx::query_as("SELECT id, name FROM clients WHERE id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;
        Ok(client)
    }

    pub async fn register_search(
        &self,
        search_term: &str,
        client_name: Option<&str>,
    ) -> Result<(), CoreError> {
        debug!("Registering search: {:?} : {}", client_name, search_term);
        let Some(client) = self.get_or_add_client(client_name).await? else {
            return Ok(());
        };

        let result = sqlx::query(
            r#"
            INSERT INTO search (client_id, search_term)
            VALUES (?, ?)
            ON CONFLICT (client_id, search_term) DO NOTHING
            "#,
        )
        .bind(client.id)
        .bind(search_term)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        if result.rows_affected() > 0 {
            debug!("Created search: {} : {}", client.name, search_term);
        }
        Ok(())
    }

    /// Search terms grouped by client id.
    pub async fn get_all_searches(&self) -> Result<HashMap<i64, Vec<String>>, CoreError> {
        debug!("Fetching searches");
        let searches: Vec<Search> =
            sqlx::query_as("SELECT id, client_id, search_term FROM search ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::Sql)?;
        debug!("Found searches: {}", searches.len());

        let mut search_map: HashMap<i64, Vec<String>> = HashMap::new();
        for search in searches {
            search_map
                .entry(search.client_id)
                .or_default()
                .push(search.search_term);
        }
        Ok(search_map)
    }

    /// Oldest-first comments for `client`, or for the default client when
    /// `client` is `None`. Returns `None` if neither is available.
    pub async fn get_comments(
        &self,
        client: Option<&Client>,
        limit: i64,
    ) -> Result<Option<Vec<IngestComment>>, CoreError> {
        debug!("Fetching comments");
        let client_id = match (client, self.default_client_id) {
            (Some(client), _) => client.id,
            (None, Some(default_id)) => default_id,
            (None, None) => {
                warn!("Client name and id not set in get comments");
                return Ok(None);
            }
        };

        let comments: Vec<IngestComment> = sqlx::query_as(
            r#"
            SELECT id, client_id, author, subreddit, created_utc, permalink, link_id, body
            FROM ingest_comments
            WHERE client_id = ?
            ORDER BY created_utc ASC
            LIMIT ?
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        debug!("Found comments: {}", comments.len());
        Ok(Some(comments))
    }

    pub async fn add_comment(&self, comment: &IngestComment) -> Result<(), CoreError> {
        debug!("Adding comment: {} : {}", comment.client_id, comment.id);
        sqlx::query(
            r#"
            INSERT INTO ingest_comments
            (id, client_id, author, subreddit, created_utc, permalink, link_id, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(comment.client_id)
        .bind(&comment.author)
        .bind(&comment.subreddit)
        .bind(comment.created_utc)
        .bind(&comment.permalink)
        .bind(&comment.link_id)
        .bind(&comment.body)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::ConstraintViolation {
                    constraint: format!("ingest_comments ({}, {})", comment.id, comment.client_id),
                }
            }
            other => DatabaseError::Sql(other),
        })?;
        Ok(())
    }

    pub async fn delete_comment(&self, comment: &IngestComment) -> Result<(), CoreError> {
        debug!("Deleting comment: {} : {}", comment.client_id, comment.id);
        sqlx::query("DELETE FROM ingest_comments WHERE id = ? AND client_id = ?")
            .bind(&comment.id)
            .bind(comment.client_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;
        Ok(())
    }

    pub async fn save_keystore(&self, key: &str, value: &str) -> Result<(), CoreError> {
        debug!("Saving keystore: {} : {}", key, value);
        sqlx::query(
            r#"
            INSERT INTO key_value (key, value)
            VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;
        Ok(())
    }

    pub async fn get_keystore(&self, key: &str) -> Result<Option<String>, CoreError> {
        debug!("Fetching keystore: {}", key);
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM key_value WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::Sql)?;

        match row {
            Some((value,)) => {
                debug!("Value: {:?}", value);
                Ok(value)
            }
            None => {
                debug!("Key not found");
                Ok(None)
            }
        }
    }
}

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    format!("{}.db", now.format("%Y-%m-%d_%H-%M"))
}
