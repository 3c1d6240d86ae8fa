use bytes::BytesMut;
use futures::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use super::{ChatMessage, FragmentSender, TextGeneration};
use crate::config::{GenerationConfig, RequestConfig};
use crate::error::{GenerationError, GenerationResult};

/// Client for an OpenAI-style chat-completion HTTP endpoint
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    request_config: RequestConfig,
}

/// Event parsed from one server-sent-event line
#[derive(Debug, Clone, PartialEq)]
enum StreamEvent {
    /// Incremental completion text.
    Fragment(String),
    /// End-of-stream sentinel.
    Done,
}

impl ChatCompletionClient {
    /// Create a new chat-completion client
    pub fn new(config: &GenerationConfig, request_config: RequestConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GenerationError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single completion request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &ChatCompletionRequest,
    ) -> GenerationResult<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completion endpoint"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    GenerationError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl TextGeneration for ChatCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> GenerationResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest::new(&self.model, messages.to_vec(), temperature);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(text) => {
                    let latency = start.elapsed();
                    info!(
                        model = %self.model,
                        latency_ms = latency.as_millis(),
                        "Completion succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Completion failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(GenerationError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        fragments: FragmentSender,
    ) -> GenerationResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request =
            ChatCompletionRequest::new(&self.model, messages.to_vec(), temperature).streaming();

        let start = Instant::now();

        // No retry loop: once fragments have been delivered the stream
        // cannot be replayed without duplicating caller-visible output.
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    GenerationError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = BytesMut::new();
        let mut full_text = String::new();
        let mut done = false;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    GenerationError::InvalidResponse {
                        message: format!("Stream read failed: {}", e),
                    }
                }
            })?;
            buffer.extend_from_slice(&chunk);

            // Lines are parsed only once complete, so multi-byte characters
            // split across network chunks stay intact.
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.split_to(pos + 1);
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);

                match parse_sse_line(line.trim_end_matches('\r')) {
                    Some(StreamEvent::Done) => {
                        done = true;
                        break 'outer;
                    }
                    Some(StreamEvent::Fragment(text)) => {
                        full_text.push_str(&text);
                        // Receiver may have been dropped by an abandoning
                        // caller; keep assembling the full text anyway.
                        if fragments.send(text).await.is_err() {
                            debug!("Fragment receiver dropped, continuing to assemble");
                        }
                    }
                    None => {}
                }
            }
        }

        info!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis(),
            bytes = full_text.len(),
            done,
            "Streaming completion finished"
        );

        Ok(full_text)
    }
}

/// Parse one SSE line into a stream event. Returns `None` for comments,
/// keep-alives, and non-data lines.
fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .first()
            .and_then(|c| c.delta.content.clone())
            .filter(|s| !s.is_empty())
            .map(StreamEvent::Fragment),
        Err(e) => {
            warn!(error = %e, line = %data, "Skipping unparseable SSE chunk");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ChatCompletionClient {
        let config = GenerationConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.example.com/v1/".to_string(),
            model: "test-model".to_string(),
            chat_temperature: 0.7,
            analysis_temperature: 0.1,
        };
        ChatCompletionClient::new(&config, RequestConfig::default()).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = test_client();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[test]
    fn test_parse_sse_line_fragment() {
        let line = r#"data: {"choices": [{"delta": {"content": "hello"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(StreamEvent::Fragment("hello".to_string()))
        );
    }

    #[test]
    fn test_parse_sse_line_done() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(StreamEvent::Done));
    }

    #[test]
    fn test_parse_sse_line_empty_delta() {
        let line = r#"data: {"choices": [{"delta": {}}]}"#;
        assert_eq!(parse_sse_line(line), None);
    }

    #[test]
    fn test_parse_sse_line_ignores_non_data() {
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line("event: message"), None);
    }

    #[test]
    fn test_parse_sse_line_ignores_garbage_payload() {
        assert_eq!(parse_sse_line("data: not json"), None);
    }
}
