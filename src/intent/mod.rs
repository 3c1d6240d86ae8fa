//! Intent classification for user turns.
//!
//! The classifier delegates to the text-generation capability with a fixed
//! JSON-demanding instruction, falls back to keyword scanning when the
//! response is malformed, and never surfaces an error: any ambiguity or
//! internal failure yields [`Intent::Unknown`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generation::{extract_json_from_completion, ChatMessage, TextGeneration};
use crate::prompts::INTENT_CLASSIFIER_PROMPT;

/// Classification of a user turn into one of the supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Review an existing file or piece of code.
    Review,
    /// Improve existing code.
    Optimize,
    /// Write new code.
    Generate,
    /// Plain conversation.
    Chat,
    /// The request could not be understood.
    Unknown,
}

impl Default for Intent {
    fn default() -> Self {
        Intent::Unknown
    }
}

impl Intent {
    /// Get the intent name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Review => "review",
            Intent::Optimize => "optimize",
            Intent::Generate => "generate",
            Intent::Chat => "chat",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "review" => Ok(Intent::Review),
            "optimize" => Ok(Intent::Optimize),
            "generate" => Ok(Intent::Generate),
            "chat" => Ok(Intent::Chat),
            "unknown" => Ok(Intent::Unknown),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Result of classifying one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The classified intent.
    pub intent: Intent,
    /// File name extracted from the message, when present.
    pub filename: Option<String>,
}

impl Classification {
    /// The safe default for anything unintelligible.
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            filename: None,
        }
    }
}

/// Expected JSON shape of the classifier completion
#[derive(Debug, Deserialize)]
struct ClassifierResponse {
    intent: String,
    #[serde(default)]
    filename: Option<String>,
}

/// Classifier turning the latest user utterance into an [`Intent`] plus
/// optional structured metadata.
#[derive(Clone)]
pub struct IntentClassifier {
    generator: Arc<dyn TextGeneration>,
    temperature: f32,
}

impl IntentClassifier {
    /// Create a new intent classifier
    pub fn new(generator: Arc<dyn TextGeneration>, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    /// Classify the latest user message.
    ///
    /// Pure function of the message and the generation capability's state;
    /// never raises to the caller.
    pub async fn classify(&self, latest_user_message: &str) -> Classification {
        let messages = vec![
            ChatMessage::system(INTENT_CLASSIFIER_PROMPT),
            ChatMessage::user(format!("User message: {}", latest_user_message)),
        ];

        let raw = match self.generator.complete(&messages, self.temperature).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Intent classification call failed, defaulting to unknown");
                return Classification::unknown();
            }
        };

        let mut classification = match parse_classifier_response(&raw) {
            Some(c) => c,
            None => {
                debug!(
                    response_preview = %raw.chars().take(100).collect::<String>(),
                    "Classifier response was not JSON, falling back to keyword scan"
                );
                keyword_fallback(&raw)
            }
        };

        // Review and optimize need a concrete target file at classification
        // time; without one the turn is treated as unintelligible.
        let lower = raw.to_lowercase();
        if (lower.contains("review") || lower.contains("optimize"))
            && classification.filename.is_none()
        {
            debug!(
                intent = %classification.intent,
                "Response mentions review/optimize without a filename, downgrading to unknown"
            );
            classification.intent = Intent::Unknown;
        }

        debug!(
            intent = %classification.intent,
            filename = ?classification.filename,
            "Intent classified"
        );

        classification
    }
}

/// Parse the classifier's JSON completion; `None` when unparseable.
fn parse_classifier_response(raw: &str) -> Option<Classification> {
    let json = extract_json_from_completion(raw).ok()?;
    let response: ClassifierResponse = serde_json::from_str(json).ok()?;

    let intent = response.intent.parse().unwrap_or(Intent::Unknown);
    let filename = response.filename.filter(|f| !f.trim().is_empty());

    Some(Classification { intent, filename })
}

/// Keyword fallback over the raw response text.
///
/// Substring match in fixed order; first match wins.
fn keyword_fallback(raw: &str) -> Classification {
    let lower = raw.to_lowercase();

    let intent = if lower.contains("review") {
        Intent::Review
    } else if lower.contains("optimize") {
        Intent::Optimize
    } else if lower.contains("generate") {
        Intent::Generate
    } else if lower.contains("chat") {
        Intent::Chat
    } else {
        Intent::Unknown
    };

    Classification {
        intent,
        filename: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, GenerationResult};
    use crate::generation::FragmentSender;
    use async_trait::async_trait;

    /// Generator returning one fixed response (or a fixed failure).
    struct StaticGenerator {
        response: GenerationResult<String>,
    }

    impl StaticGenerator {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(GenerationError::Timeout { timeout_ms: 1 }),
            })
        }
    }

    #[async_trait]
    impl TextGeneration for StaticGenerator {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> GenerationResult<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(GenerationError::Timeout { timeout_ms: 1 }),
            }
        }

        async fn complete_stream(
            &self,
            messages: &[ChatMessage],
            temperature: f32,
            _fragments: FragmentSender,
        ) -> GenerationResult<String> {
            self.complete(messages, temperature).await
        }
    }

    #[test]
    fn test_intent_as_str_round_trip() {
        for intent in [
            Intent::Review,
            Intent::Optimize,
            Intent::Generate,
            Intent::Chat,
            Intent::Unknown,
        ] {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert!("refactor".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_default_is_unknown() {
        assert_eq!(Intent::default(), Intent::Unknown);
    }

    #[tokio::test]
    async fn test_classify_json_generate() {
        let generator = StaticGenerator::replying(r#"{"intent": "generate", "filename": null}"#);
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("write a sum function").await;
        assert_eq!(result.intent, Intent::Generate);
        assert!(result.filename.is_none());
    }

    #[tokio::test]
    async fn test_classify_json_review_with_filename() {
        let generator =
            StaticGenerator::replying(r#"{"intent": "review", "filename": "main.py"}"#);
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("review my file main.py").await;
        assert_eq!(result.intent, Intent::Review);
        assert_eq!(result.filename.as_deref(), Some("main.py"));
    }

    #[tokio::test]
    async fn test_classify_fenced_json() {
        let generator = StaticGenerator::replying(
            "```json\n{\"intent\": \"chat\", \"filename\": null}\n```",
        );
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("hello there").await;
        assert_eq!(result.intent, Intent::Chat);
    }

    #[tokio::test]
    async fn test_classify_review_without_filename_downgrades() {
        let generator = StaticGenerator::replying(r#"{"intent": "review", "filename": null}"#);
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("review something").await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_classify_optimize_without_filename_downgrades() {
        let generator = StaticGenerator::replying("the user wants to optimize their code");
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("make it faster").await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_classify_keyword_fallback_order() {
        // "review" appears before "generate" in the priority order even
        // though both words occur.
        let generator =
            StaticGenerator::replying("I would review file a.py then generate tests for it");
        let classifier = IntentClassifier::new(generator, 0.1);

        // Fallback never extracts a filename, so review downgrades.
        let result = classifier.classify("do something").await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_classify_keyword_fallback_generate() {
        let generator = StaticGenerator::replying("this asks me to generate code");
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("write a parser").await;
        assert_eq!(result.intent, Intent::Generate);
    }

    #[tokio::test]
    async fn test_classify_garbage_is_unknown() {
        let generator = StaticGenerator::replying("no keywords here at all");
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("?????").await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_classify_service_failure_is_unknown() {
        let generator = StaticGenerator::failing();
        let classifier = IntentClassifier::new(generator, 0.1);

        let result = classifier.classify("anything").await;
        assert_eq!(result, Classification::unknown());
    }

    #[test]
    fn test_parse_classifier_response_invalid_intent_string() {
        let result = parse_classifier_response(r#"{"intent": "refactor"}"#).unwrap();
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[test]
    fn test_parse_classifier_response_blank_filename_dropped() {
        let result =
            parse_classifier_response(r#"{"intent": "generate", "filename": "  "}"#).unwrap();
        assert!(result.filename.is_none());
    }

    #[test]
    fn test_keyword_fallback_chat() {
        assert_eq!(keyword_fallback("just a chat request").intent, Intent::Chat);
    }
}
