//! # Codeflow Assistant
//!
//! A conversational code-quality pipeline: free-form user text is
//! classified into an intent, routed through chat, code-generation,
//! code-review, or code-optimization steps, and the generate/review/
//! optimize cycle converges under a bounded review policy.
//!
//! ## Features
//!
//! - **Intent Routing**: LLM-backed classification with keyword fallback
//! - **Workflow Engine**: a data-driven step graph with explicit cycle
//!   budgets guaranteeing termination for any review-score sequence
//! - **Review Policies**: tiered (90/60 with force-pass band) or simple
//!   threshold convergence, selected per deployment
//! - **Sessions**: per-thread conversation memory with FIFO run
//!   serialization and optional SQLite checkpointing
//! - **Streaming**: incremental output fragments with a metadata event and
//!   completion sentinel
//!
//! ## Architecture
//!
//! ```text
//! Adapter → Assistant → WorkflowEngine → Chat-Completion API (HTTP)
//!                ↓
//!        SessionManager (memory, optional SQLite checkpoint)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use codeflow_assistant::{Assistant, Config};
//! use codeflow_assistant::generation::ChatCompletionClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = ChatCompletionClient::new(&config.generation, config.request.clone())?;
//!     let assistant = Assistant::new(&config, Arc::new(client), None);
//!     let outcome = assistant.run("thread-1", "generate a fizzbuzz function").await;
//!     println!("{}", outcome.output);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Engine operations facade exposed to front-end adapters.
pub mod assistant;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Text-generation capability boundary and HTTP client.
pub mod generation;
/// Intent classification for user turns.
pub mod intent;
/// System prompts for the workflow steps.
pub mod prompts;
/// Session management and per-thread state.
pub mod session;
/// SQLite storage layer for durable session checkpoints.
pub mod storage;
/// Workflow graph, state, engine, and review policy.
pub mod workflow;

pub use assistant::{Assistant, AssistantEvent};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use workflow::RunOutcome;
