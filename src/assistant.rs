//! Engine operations facade for front-end adapters.
//!
//! Adapters (HTTP endpoints, CLI REPLs, chat UIs) call exactly the
//! operations on [`Assistant`]: [`run`](Assistant::run),
//! [`run_stream`](Assistant::run_stream), [`history`](Assistant::history),
//! [`clear_history`](Assistant::clear_history), and
//! [`delete_session`](Assistant::delete_session).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::generation::{ChatMessage, TextGeneration};
use crate::intent::{Intent, IntentClassifier};
use crate::session::SessionManager;
use crate::storage::SqliteStorage;
use crate::workflow::{RunOutcome, WorkflowEngine};

/// Size of replayed output chunks. Presentation detail only: fragments
/// always concatenate to the exact output text.
const REPLAY_CHUNK_CHARS: usize = 64;

/// Events delivered to a streaming front-end adapter.
///
/// A streaming run emits zero or more `Fragment` events whose texts
/// concatenate to the run's output, then one `Metadata` event, then `Done`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// A fragment of the output text.
    Fragment {
        /// The fragment text.
        text: String,
    },
    /// Run metadata, sent after the last fragment.
    Metadata {
        /// Score of the last review this run.
        review_score: u8,
        /// Comments of the last review this run.
        review_comments: String,
        /// Whether the review/optimize loop ended as passed.
        review_passed: bool,
        /// Code produced by the generate step, when one ran.
        generated_code: Option<String>,
        /// Code produced by the optimize step, when one ran.
        optimized_code: Option<String>,
        /// Intent classified for the run.
        intent: Intent,
    },
    /// Completion sentinel.
    Done,
}

/// The conversational code-quality pipeline: session manager plus workflow
/// engine behind the three front-end operations.
pub struct Assistant {
    engine: WorkflowEngine,
    sessions: SessionManager,
}

impl Assistant {
    /// Create a new assistant from configuration, a generation capability,
    /// and an optional durable checkpoint store
    pub fn new(
        config: &Config,
        generator: Arc<dyn TextGeneration>,
        storage: Option<SqliteStorage>,
    ) -> Self {
        let classifier =
            IntentClassifier::new(generator.clone(), config.generation.analysis_temperature);
        let engine = WorkflowEngine::new(
            generator,
            classifier,
            config.workflow.clone(),
            config.generation.chat_temperature,
            config.generation.analysis_temperature,
        );
        Self {
            engine,
            sessions: SessionManager::new(storage),
        }
    }

    /// Execute one workflow run for a thread.
    ///
    /// Runs for the same thread are serialized FIFO; runs for distinct
    /// threads proceed concurrently.
    pub async fn run(&self, thread_id: &str, input: &str) -> RunOutcome {
        let entry = self.sessions.get_or_create(thread_id).await;
        let mut state = entry.state.lock().await;
        let outcome = self.engine.run(&mut state, input, None).await;
        self.sessions.checkpoint(thread_id, &state).await;
        outcome
    }

    /// Execute one workflow run, delivering the output incrementally.
    ///
    /// Conversational turns stream genuine fragments from the generation
    /// capability; other turns replay the formatted output in chunks once
    /// the run completes. A dropped receiver never aborts the run: session
    /// state and counters stay consistent and the outcome is still
    /// returned.
    pub async fn run_stream(
        &self,
        thread_id: &str,
        input: &str,
        events: mpsc::Sender<AssistantEvent>,
    ) -> RunOutcome {
        let (fragment_tx, mut fragment_rx) = mpsc::channel::<String>(32);
        let fragment_events = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(text) = fragment_rx.recv().await {
                if fragment_events
                    .send(AssistantEvent::Fragment { text })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let outcome = {
            let entry = self.sessions.get_or_create(thread_id).await;
            let mut state = entry.state.lock().await;
            let outcome = self.engine.run(&mut state, input, Some(&fragment_tx)).await;
            self.sessions.checkpoint(thread_id, &state).await;
            outcome
        };

        drop(fragment_tx);
        let _ = forwarder.await;

        if !outcome.streamed {
            for text in chunk_text(&outcome.output, REPLAY_CHUNK_CHARS) {
                if events.send(AssistantEvent::Fragment { text }).await.is_err() {
                    break;
                }
            }
        }

        let _ = events
            .send(AssistantEvent::Metadata {
                review_score: outcome.review_score,
                review_comments: outcome.review_comments.clone(),
                review_passed: outcome.review_passed,
                generated_code: outcome.generated_code.clone(),
                optimized_code: outcome.optimized_code.clone(),
                intent: outcome.intent,
            })
            .await;
        let _ = events.send(AssistantEvent::Done).await;

        outcome
    }

    /// Ordered message history of a thread.
    pub async fn history(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.sessions.history(thread_id).await
    }

    /// Clear a thread's conversation and workflow state.
    pub async fn clear_history(&self, thread_id: &str) {
        self.sessions.clear_history(thread_id).await
    }

    /// Explicitly delete a session.
    pub async fn delete_session(&self, thread_id: &str) {
        self.sessions.delete(thread_id).await
    }
}

/// Split text into chunks of at most `size` characters, on char
/// boundaries.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
