use serde::{Deserialize, Serialize};

/// Message in a conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the role name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for an OpenAI-style chat completion call
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a new non-streaming completion request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            stream: false,
        }
    }

    /// Enable server-sent-event streaming
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Response body of a non-streaming chat completion call
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

/// A single completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: AssistantReply,
}

/// The assistant message inside a completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantReply {
    pub content: String,
}

/// One server-sent-event chunk of a streaming completion
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

/// A single choice delta within a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
}

/// Incremental content carried by a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::system("instructions");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content, "instructions");

        let msg = ChatMessage::user("question");
        assert_eq!(msg.role, Role::User);

        let msg = ChatMessage::assistant("answer");
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn test_completion_request_serialize() {
        let request = ChatCompletionRequest::new(
            "test-model",
            vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            0.7,
        );
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("test-model"));
        assert!(json.contains(r#""stream":false"#));
        assert!(json.contains(r#""temperature":0.7"#));
    }

    #[test]
    fn test_completion_request_streaming() {
        let request = ChatCompletionRequest::new("m", vec![], 0.1).streaming();
        assert!(request.stream);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""stream":true"#));
    }

    #[test]
    fn test_completion_response_deserialize() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "hello");
    }

    #[test]
    fn test_chunk_deserialize() {
        let json = r#"{"choices": [{"delta": {"content": "frag"}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("frag"));
    }

    #[test]
    fn test_chunk_deserialize_empty_delta() {
        let json = r#"{"choices": [{"delta": {}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
