use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{SessionRecord, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::generation::ChatMessage;
use crate::session::SessionState;
use crate::workflow::WorkflowState;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed checkpoint storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance (tests and ephemeral use).
    ///
    /// In-memory SQLite databases are per-connection, so the pool is
    /// pinned to a single connection.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    thread_id: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    snapshot: String,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let parse = |value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::Query {
                    message: format!("Invalid timestamp '{}': {}", value, e),
                })
        };
        Ok(SessionRecord {
            created_at: parse(&row.created_at)?,
            updated_at: parse(&row.updated_at)?,
            thread_id: row.thread_id,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn load_session(&self, thread_id: &str) -> StorageResult<Option<SessionState>> {
        let session: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT thread_id, created_at, updated_at
            FROM sessions
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        if session.is_none() {
            return Ok(None);
        }

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT role, content
            FROM messages
            WHERE thread_id = ?
            ORDER BY seq
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let role = row.role.parse().map_err(|e| StorageError::Query {
                    message: format!("Invalid stored role: {}", e),
                })?;
                Ok(ChatMessage {
                    role,
                    content: row.content,
                })
            })
            .collect::<StorageResult<Vec<ChatMessage>>>()?;

        let snapshot: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT snapshot
            FROM workflow_states
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        let workflow = match snapshot {
            Some(row) => serde_json::from_str::<WorkflowState>(&row.snapshot)?,
            None => WorkflowState::default(),
        };

        Ok(Some(SessionState { messages, workflow }))
    }

    async fn save_session(&self, thread_id: &str, state: &SessionState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let snapshot = serde_json::to_string(&state.workflow)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (thread_id, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(thread_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // The transcript is replaced wholesale: the in-memory session is
        // the source of truth and the checkpoint mirrors it.
        sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        for (seq, message) in state.messages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO messages (id, thread_id, seq, role, content, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(thread_id)
            .bind(seq as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO workflow_states (thread_id, snapshot, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE
            SET snapshot = excluded.snapshot, updated_at = excluded.updated_at
            "#,
        )
        .bind(thread_id)
        .bind(&snapshot)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete_session(&self, thread_id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_states WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT thread_id, created_at, updated_at
            FROM sessions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_creation() {
        let storage = SqliteStorage::new_in_memory().await;
        assert!(storage.is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_session_is_none() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let loaded = storage.load_session("nope").await.unwrap();
        assert!(loaded.is_none());
    }
}
