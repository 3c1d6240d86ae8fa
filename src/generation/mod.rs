//! Text-generation capability boundary.
//!
//! This module defines the [`TextGeneration`] trait that the workflow engine
//! and intent classifier depend on, the conversation [`ChatMessage`] types,
//! and the [`ChatCompletionClient`] implementation backed by an OpenAI-style
//! chat-completion HTTP endpoint.

mod client;
mod types;

pub use client::ChatCompletionClient;
pub use types::{
    AssistantReply, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, Choice, ChunkChoice, ChunkDelta, Role,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GenerationResult;

/// Sender half used to deliver incremental fragments of a streaming
/// completion to a caller.
pub type FragmentSender = mpsc::Sender<String>;

/// Capability to submit a structured conversation and receive generated
/// text, optionally as an incremental fragment stream.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    /// Submit the conversation and wait for the full completion text.
    async fn complete(&self, messages: &[ChatMessage], temperature: f32)
        -> GenerationResult<String>;

    /// Streaming variant of [`complete`](Self::complete).
    ///
    /// Fragments sent over `fragments` concatenate to the returned full
    /// text. A dropped receiver must not fail the call: implementations
    /// keep assembling and return the complete text regardless.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        fragments: FragmentSender,
    ) -> GenerationResult<String>;
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Try parsing as raw JSON first (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    // Fast path: raw JSON
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    // Try ```json ... ``` blocks
    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    // Try ``` ... ``` blocks
    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}
