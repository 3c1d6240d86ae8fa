//! Session management: per-thread conversation state and run serialization.
//!
//! A session is created on first reference to an unseen thread id and lives
//! for the process lifetime unless explicitly deleted. Runs for the same
//! thread are serialized FIFO through a per-session lock; runs for distinct
//! threads proceed concurrently. When a durable store is configured,
//! sessions are lazily restored from their checkpoint and re-checkpointed
//! after each run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::generation::ChatMessage;
use crate::storage::{SqliteStorage, Storage};
use crate::workflow::WorkflowState;

/// Per-thread state: the ordered conversation transcript plus the workflow
/// state carried between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Append-only message log; insertion order is the transcript order.
    pub messages: Vec<ChatMessage>,
    /// Workflow state merged back after each run.
    pub workflow: WorkflowState,
}

/// A registered session and its serialization lock.
pub struct SessionEntry {
    /// Per-session lock: at most one run in flight, FIFO by arrival.
    pub state: Mutex<SessionState>,
}

impl SessionEntry {
    fn with_state(state: SessionState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }
}

/// Owner of all sessions, mapping thread ids to their state.
///
/// Injected into the engine's callers rather than referenced as ambient
/// state; sessions are added and removed only through this API.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<SessionEntry>>>,
    storage: Option<SqliteStorage>,
}

impl SessionManager {
    /// Create a new session manager, optionally backed by a durable store
    pub fn new(storage: Option<SqliteStorage>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            storage,
        }
    }

    /// Get the session for a thread id, creating (or restoring) it on
    /// first reference.
    pub async fn get_or_create(&self, thread_id: &str) -> Arc<SessionEntry> {
        {
            let sessions = self.sessions.lock().await;
            if let Some(entry) = sessions.get(thread_id) {
                return entry.clone();
            }
        }

        // Restore outside the map lock so a slow checkpoint load never
        // blocks unrelated threads.
        let restored = match &self.storage {
            Some(storage) => match storage.load_session(thread_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(thread_id, error = %e, "Checkpoint restore failed, starting fresh");
                    None
                }
            },
            None => None,
        };

        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread_id, restored = restored.is_some(), "Session created");
                SessionEntry::with_state(restored.unwrap_or_default())
            })
            .clone()
    }

    /// Ordered message history of a thread.
    pub async fn history(&self, thread_id: &str) -> Vec<ChatMessage> {
        let entry = self.get_or_create(thread_id).await;
        let state = entry.state.lock().await;
        state.messages.clone()
    }

    /// Clear a thread's conversation and workflow state.
    pub async fn clear_history(&self, thread_id: &str) {
        let entry = self.get_or_create(thread_id).await;
        {
            let mut state = entry.state.lock().await;
            *state = SessionState::default();
        }
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.delete_session(thread_id).await {
                warn!(thread_id, error = %e, "Failed to clear session checkpoint");
            }
        }
        debug!(thread_id, "Session history cleared");
    }

    /// Explicitly delete a session.
    pub async fn delete(&self, thread_id: &str) {
        self.sessions.lock().await.remove(thread_id);
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.delete_session(thread_id).await {
                warn!(thread_id, error = %e, "Failed to delete session checkpoint");
            }
        }
        debug!(thread_id, "Session deleted");
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Checkpoint a session's state, best-effort.
    ///
    /// Checkpoint failures are logged and never fail the run that produced
    /// the state.
    pub async fn checkpoint(&self, thread_id: &str, state: &SessionState) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_session(thread_id, state).await {
                warn!(thread_id, error = %e, "Checkpoint save failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_entry() {
        let manager = SessionManager::new(None);
        let a = manager.get_or_create("t1").await;
        let b = manager.get_or_create("t1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::new(None);
        {
            let entry = manager.get_or_create("a").await;
            let mut state = entry.state.lock().await;
            state.messages.push(ChatMessage::user("only in a"));
        }

        assert_eq!(manager.history("a").await.len(), 1);
        assert!(manager.history("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_history_then_history_is_empty() {
        let manager = SessionManager::new(None);
        {
            let entry = manager.get_or_create("t").await;
            let mut state = entry.state.lock().await;
            state.messages.push(ChatMessage::user("hello"));
            state.workflow.review_score = 90;
        }

        manager.clear_history("t").await;
        assert!(manager.history("t").await.is_empty());

        // Idempotent: clearing again changes nothing.
        manager.clear_history("t").await;
        assert!(manager.history("t").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_session() {
        let manager = SessionManager::new(None);
        manager.get_or_create("gone").await;
        assert_eq!(manager.session_count().await, 1);

        manager.delete("gone").await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_per_session_lock_serializes_runs() {
        let manager = SessionManager::new(None);
        let entry = manager.get_or_create("serial").await;

        let first = entry.state.lock().await;
        // A second lock attempt must not succeed while the first guard is
        // held.
        assert!(entry.state.try_lock().is_err());
        drop(first);
        assert!(entry.state.try_lock().is_ok());
    }
}
