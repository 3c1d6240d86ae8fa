//! Workflow engine executing the step graph for one user turn.
//!
//! The engine owns termination: a hard per-run step budget plus the review
//! policy's optimize ceiling bound the generate/review/optimize cycle for
//! any sequence of scores. Step functions are total - internal failures
//! are captured into the run's output text and the run always reaches the
//! output step.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{route_by_intent, static_successor, ReviewVerdict, Step};
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::generation::extract_json_from_completion;
use crate::generation::{ChatMessage, FragmentSender, Role, TextGeneration};
use crate::intent::{Classification, Intent, IntentClassifier};
use crate::prompts::{
    CHAT_PROMPT, CODE_GENERATE_PROMPT, CODE_OPTIMIZE_PROMPT, CODE_REVIEW_PROMPT,
};
use crate::session::SessionState;

/// Result of one workflow run, returned to front-end adapters.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Final user-visible response text.
    pub output: String,
    /// Score of the last review this run (0-100, 0 when none ran).
    pub review_score: u8,
    /// Comments of the last review this run.
    pub review_comments: String,
    /// Whether the review/optimize loop ended as passed.
    pub review_passed: bool,
    /// Code produced by the generate step, when one ran.
    pub generated_code: Option<String>,
    /// Code produced by the optimize step, when one ran.
    pub optimized_code: Option<String>,
    /// Intent classified for this run.
    pub intent: Intent,
    /// Whether output fragments were already delivered incrementally.
    pub streamed: bool,
}

/// Expected JSON shape of a review completion
#[derive(Debug, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    comments: String,
}

/// Review fields after tolerant parsing
#[derive(Debug, Clone, PartialEq)]
struct ParsedReview {
    score: u8,
    comments: String,
}

/// Directed graph of named steps executing one user turn over a session.
pub struct WorkflowEngine {
    generator: Arc<dyn TextGeneration>,
    classifier: IntentClassifier,
    config: WorkflowConfig,
    chat_temperature: f32,
    analysis_temperature: f32,
}

impl WorkflowEngine {
    /// Create a new workflow engine
    pub fn new(
        generator: Arc<dyn TextGeneration>,
        classifier: IntentClassifier,
        config: WorkflowConfig,
        chat_temperature: f32,
        analysis_temperature: f32,
    ) -> Self {
        Self {
            generator,
            classifier,
            config,
            chat_temperature,
            analysis_temperature,
        }
    }

    /// Execute one workflow run for `input` over the given session.
    ///
    /// When `fragments` is provided, conversational turns stream their
    /// response incrementally; the returned outcome's `streamed` flag says
    /// whether that happened. The run always terminates within the step
    /// budget and always produces an output string.
    pub async fn run(
        &self,
        session: &mut SessionState,
        input: &str,
        fragments: Option<&FragmentSender>,
    ) -> RunOutcome {
        let started = Instant::now();
        session.workflow.begin_run(input);

        let mut current = Step::ProcessInput;
        let mut steps_taken: u32 = 0;
        let mut streamed = false;

        loop {
            if current == Step::Output {
                self.output_step(session);
                steps_taken += 1;
                break;
            }
            if steps_taken >= self.config.step_budget {
                // CycleBudgetExceeded is not user-visible: silently force
                // the run forward to termination.
                warn!(
                    steps = steps_taken,
                    budget = self.config.step_budget,
                    "Per-run step budget exhausted, forcing output"
                );
                current = Step::Output;
                continue;
            }

            debug!(step = %current, "Executing workflow step");
            current = match current {
                Step::ProcessInput => self.process_input(session),
                Step::AnalyzeIntent => self.analyze_intent(session).await,
                Step::ErrorHandling => self.error_handling(session),
                Step::Chat => {
                    let (next, did_stream) = self.chat(session, fragments).await;
                    streamed |= did_stream;
                    next
                }
                Step::CodeGenerate => self.code_generate(session).await,
                Step::CodeReview => self.code_review(session).await,
                Step::CodeOptimize => self.code_optimize(session).await,
                Step::Output => unreachable!("output handled above"),
            };
            steps_taken += 1;
        }

        let wf = &session.workflow;
        info!(
            intent = %wf.current_intent,
            steps = steps_taken,
            reviews = wf.review_count,
            optimizes = wf.optimize_count,
            score = wf.review_score,
            passed = wf.review_passed,
            latency_ms = started.elapsed().as_millis(),
            "Workflow run completed"
        );

        RunOutcome {
            output: wf.output.clone(),
            review_score: wf.review_score,
            review_comments: wf.review_comments.clone(),
            review_passed: wf.review_passed,
            generated_code: wf.generated_code.clone(),
            optimized_code: wf.optimized_code.clone(),
            intent: wf.current_intent,
            streamed,
        }
    }

    /// Append the pending user input to the conversation.
    fn process_input(&self, session: &mut SessionState) -> Step {
        let input = session.workflow.pending_input.trim().to_string();
        session.workflow.pending_input.clear();
        session.workflow.last_step = Some(Step::ProcessInput);

        if input.is_empty() {
            session.workflow.output = "Please provide a message.".to_string();
            return Step::Output;
        }

        session.messages.push(ChatMessage::user(input));
        static_successor(Step::ProcessInput).unwrap_or(Step::Output)
    }

    /// Classify the most recent user message and route on the intent.
    async fn analyze_intent(&self, session: &mut SessionState) -> Step {
        let latest = session
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());

        let classification = match latest {
            Some(message) => self.classifier.classify(&message).await,
            None => Classification::unknown(),
        };

        let wf = &mut session.workflow;
        wf.current_intent = classification.intent;
        wf.filename = classification.filename;
        wf.last_step = Some(Step::AnalyzeIntent);

        let next = route_by_intent(classification.intent);
        debug!(intent = %classification.intent, next = %next, "Routed by intent");
        next
    }

    /// Produce the fixed clarification message.
    ///
    /// The message is transient output only; the output step does not add
    /// it to the conversation, so failed turns never pollute memory.
    fn error_handling(&self, session: &mut SessionState) -> Step {
        session.workflow.output = "I could not understand your request. Please say whether you \
            want a code review, code optimization, code generation, or just to chat."
            .to_string();
        session.workflow.last_step = Some(Step::ErrorHandling);
        static_successor(Step::ErrorHandling).unwrap_or(Step::Output)
    }

    /// Conversational turn over the (possibly truncated) message history.
    async fn chat(
        &self,
        session: &mut SessionState,
        fragments: Option<&FragmentSender>,
    ) -> (Step, bool) {
        let mut outbound = vec![ChatMessage::system(CHAT_PROMPT)];
        outbound.extend(truncated_history(
            &session.messages,
            self.config.history_limit,
            self.config.history_keep_recent,
        ));

        let result = match fragments {
            Some(tx) => self
                .generator
                .complete_stream(&outbound, self.chat_temperature, tx.clone())
                .await
                .map(|text| (text, true)),
            None => self
                .generator
                .complete(&outbound, self.chat_temperature)
                .await
                .map(|text| (text, false)),
        };

        let wf = &mut session.workflow;
        wf.last_step = Some(Step::Chat);
        match result {
            Ok((text, did_stream)) => {
                wf.output = text;
                (static_successor(Step::Chat).unwrap_or(Step::Output), did_stream)
            }
            Err(e) => {
                warn!(error = %e, "Chat generation failed");
                wf.output = format!("Error: generation failed: {}", e);
                (Step::Output, false)
            }
        }
    }

    /// Generate code from the latest user message.
    async fn code_generate(&self, session: &mut SessionState) -> Step {
        let requirements = session
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());

        let requirements = match requirements {
            Some(r) => r,
            None => {
                session.workflow.output =
                    format!("Error: {}", WorkflowError::MissingCodeTarget { operation: "generate" });
                session.workflow.last_step = Some(Step::CodeGenerate);
                return Step::Output;
            }
        };

        let messages = vec![
            ChatMessage::system(CODE_GENERATE_PROMPT),
            ChatMessage::user(format!("Requirements: {}", requirements)),
        ];

        let wf_next = match self.generator.complete(&messages, self.chat_temperature).await {
            Ok(code) => {
                debug!(bytes = code.len(), "Code generated");
                let wf = &mut session.workflow;
                wf.generated_code = Some(code.clone());
                wf.optimized_code = None;
                wf.code_content = Some(code);
                static_successor(Step::CodeGenerate).unwrap_or(Step::Output)
            }
            Err(e) => {
                warn!(error = %e, "Code generation failed");
                session.workflow.output = format!("Error: generation failed: {}", e);
                Step::Output
            }
        };
        session.workflow.last_step = Some(Step::CodeGenerate);
        wf_next
    }

    /// Review the current code target, score it, and route on the verdict.
    async fn code_review(&self, session: &mut SessionState) -> Step {
        let target = self.select_review_target(session).await;

        let (code, context) = match target {
            Ok(pair) => pair,
            Err(e) => {
                let wf = &mut session.workflow;
                wf.output = format!("Error: {}", e);
                wf.review_score = 0;
                wf.review_passed = false;
                wf.last_step = Some(Step::CodeReview);
                return Step::Output;
            }
        };

        debug!(bytes = code.len(), context = %context, "Reviewing code");

        let messages = vec![
            ChatMessage::system(CODE_REVIEW_PROMPT),
            ChatMessage::user(format!(
                "Code:\n```\n{}\n```\n\nContext: {}",
                code, context
            )),
        ];

        let raw = match self
            .generator
            .complete(&messages, self.analysis_temperature)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Code review generation failed");
                let wf = &mut session.workflow;
                wf.output = format!("Error: generation failed: {}", e);
                wf.review_score = 0;
                wf.review_passed = false;
                wf.last_step = Some(Step::CodeReview);
                return Step::Output;
            }
        };

        let review = parse_review_response(&raw);

        let wf = &mut session.workflow;
        wf.review_count += 1;
        wf.review_score = review.score;
        wf.review_comments = review.comments;
        wf.last_step = Some(Step::CodeReview);

        let verdict = self.config.policy.decide(
            wf.review_score,
            wf.optimize_count,
            self.config.max_optimize_rounds,
        );
        wf.review_passed = verdict.passed();

        debug!(
            score = wf.review_score,
            verdict = ?verdict,
            reviews = wf.review_count,
            optimizes = wf.optimize_count,
            "Review verdict"
        );

        if verdict == ReviewVerdict::Optimize {
            Step::CodeOptimize
        } else {
            Step::Output
        }
    }

    /// Optimize the current code target using the latest review comments.
    async fn code_optimize(&self, session: &mut SessionState) -> Step {
        if session.workflow.last_step != Some(Step::CodeReview) {
            let wf = &mut session.workflow;
            wf.output = format!(
                "Error: {}",
                WorkflowError::MissingCodeTarget { operation: "optimize" }
            );
            wf.last_step = Some(Step::CodeOptimize);
            return Step::Output;
        }

        let target = self.select_optimize_target(session).await;
        let code = match target {
            Ok(code) => code,
            Err(e) => {
                let wf = &mut session.workflow;
                wf.output = format!("Error: {}", e);
                wf.last_step = Some(Step::CodeOptimize);
                return Step::Output;
            }
        };

        debug!(
            bytes = code.len(),
            comments_bytes = session.workflow.review_comments.len(),
            "Optimizing code"
        );

        let messages = vec![
            ChatMessage::system(CODE_OPTIMIZE_PROMPT),
            ChatMessage::user(format!(
                "Original code:\n```\n{}\n```\n\nReview comments: {}",
                code, session.workflow.review_comments
            )),
        ];

        let next = match self.generator.complete(&messages, self.chat_temperature).await {
            Ok(optimized) => {
                let wf = &mut session.workflow;
                wf.optimize_count += 1;
                wf.optimized_code = Some(optimized.clone());
                wf.code_content = Some(optimized);
                static_successor(Step::CodeOptimize).unwrap_or(Step::Output)
            }
            Err(e) => {
                warn!(error = %e, "Code optimization failed");
                session.workflow.output = format!("Error: generation failed: {}", e);
                Step::Output
            }
        };
        session.workflow.last_step = Some(Step::CodeOptimize);
        next
    }

    /// Select the code to review based on the predecessor step.
    async fn select_review_target(
        &self,
        session: &SessionState,
    ) -> Result<(String, String), WorkflowError> {
        let wf = &session.workflow;
        let (code, context) = match wf.last_step {
            Some(Step::CodeGenerate) => (
                wf.generated_code.clone().ok_or(WorkflowError::EmptyCode)?,
                "reviewing newly generated code".to_string(),
            ),
            Some(Step::CodeOptimize) => (
                wf.optimized_code.clone().ok_or(WorkflowError::EmptyCode)?,
                "reviewing optimized code".to_string(),
            ),
            Some(Step::AnalyzeIntent) => match &wf.filename {
                Some(path) => (
                    read_code_file(path).await?,
                    format!("reviewing file {}", path),
                ),
                None => {
                    return Err(WorkflowError::MissingCodeTarget { operation: "review" });
                }
            },
            _ => return Err(WorkflowError::MissingCodeTarget { operation: "review" }),
        };

        if code.trim().is_empty() {
            return Err(WorkflowError::EmptyCode);
        }
        Ok((code, context))
    }

    /// Select the code to optimize: generated, then optimized, then the
    /// referenced file.
    async fn select_optimize_target(&self, session: &SessionState) -> Result<String, WorkflowError> {
        let wf = &session.workflow;
        let code = if let Some(code) = &wf.generated_code {
            code.clone()
        } else if let Some(code) = &wf.optimized_code {
            code.clone()
        } else if let Some(path) = &wf.filename {
            read_code_file(path).await?
        } else {
            return Err(WorkflowError::MissingCodeTarget { operation: "optimize" });
        };

        if code.trim().is_empty() {
            return Err(WorkflowError::EmptyCode);
        }
        Ok(code)
    }

    /// Format the final response and merge it into the conversation.
    fn output_step(&self, session: &mut SessionState) {
        let wf = &session.workflow;
        let message = match wf.last_step {
            Some(Step::Chat) | Some(Step::ErrorHandling) => wf.output.clone(),
            Some(Step::CodeReview) if wf.review_passed => {
                if let Some(code) = &wf.optimized_code {
                    format!(
                        "✅ Code optimized and passed review!\nScore: {}/100\n\nOptimized code:\n```\n{}\n```",
                        wf.review_score, code
                    )
                } else if let Some(code) = &wf.generated_code {
                    format!(
                        "✅ Code generated and passed review!\nScore: {}/100\n\nGenerated code:\n```\n{}\n```",
                        wf.review_score, code
                    )
                } else {
                    format!(
                        "✅ Code review passed!\nScore: {}/100\nReview comments:\n{}",
                        wf.review_score, wf.review_comments
                    )
                }
            }
            _ => {
                if wf.output.is_empty() {
                    "Processing complete.".to_string()
                } else {
                    wf.output.clone()
                }
            }
        };

        // ErrorHandling and rejected input are transient: they are returned
        // to the caller but kept out of long-term memory.
        let transient = matches!(
            wf.last_step,
            Some(Step::ErrorHandling) | Some(Step::ProcessInput)
        );
        if !transient && !message.is_empty() {
            session.messages.push(ChatMessage::assistant(message.clone()));
        }

        let wf = &mut session.workflow;
        wf.output = message;
        wf.last_step = Some(Step::Output);
    }
}

/// Read a code file as UTF-8; a missing file is a reported error.
async fn read_code_file(path: &str) -> Result<String, WorkflowError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|_| WorkflowError::FileNotFound {
            path: path.to_string(),
        })
}

/// Bound the outbound chat history: beyond `limit` messages, keep all
/// system messages plus the `keep_recent` most recent others.
fn truncated_history(
    messages: &[ChatMessage],
    limit: usize,
    keep_recent: usize,
) -> Vec<ChatMessage> {
    if messages.len() <= limit {
        return messages.to_vec();
    }

    let mut kept: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();

    let start = messages.len().saturating_sub(keep_recent);
    kept.extend(
        messages[start..]
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned(),
    );
    kept
}

/// Parse a review completion, tolerating malformed output.
///
/// Unparseable responses get a benign default rather than failing the
/// step; a parsed review with no comments falls back to the raw text.
fn parse_review_response(raw: &str) -> ParsedReview {
    let parsed = extract_json_from_completion(raw)
        .ok()
        .and_then(|json| serde_json::from_str::<ReviewResponse>(json).ok());

    match parsed {
        Some(response) => ParsedReview {
            score: response.score.clamp(0.0, 100.0) as u8,
            comments: if response.comments.is_empty() {
                raw.to_string()
            } else {
                response.comments
            },
        },
        None => {
            warn!(
                response_preview = %raw.chars().take(100).collect::<String>(),
                "Review response was not JSON, using benign default"
            );
            ParsedReview {
                score: 85,
                comments: "Code quality looks good".to_string(),
            }
        }
    }
}
