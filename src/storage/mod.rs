//! Storage layer for durable session checkpoints.
//!
//! This module provides SQLite-based persistence for `(thread id, messages,
//! workflow state)` checkpoints. The core operates in process memory; a
//! deployment opts into durability by configuring a database path.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::session::SessionState;

/// Summary row for a persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Thread identifier of the session.
    pub thread_id: String,
    /// When the session was first checkpointed.
    pub created_at: DateTime<Utc>,
    /// When the session was last checkpointed.
    pub updated_at: DateTime<Utc>,
}

/// Storage trait for durable session checkpoints.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load a session checkpoint; `None` when the thread has none.
    async fn load_session(&self, thread_id: &str) -> StorageResult<Option<SessionState>>;

    /// Persist a session checkpoint, replacing any previous one.
    async fn save_session(&self, thread_id: &str, state: &SessionState) -> StorageResult<()>;

    /// Delete a session checkpoint.
    async fn delete_session(&self, thread_id: &str) -> StorageResult<()>;

    /// List all persisted sessions.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>>;
}
