//! Workflow graph types and the review-convergence policy.
//!
//! The graph is data: a fixed edge table plus two pure routing functions
//! ([`route_by_intent`], [`ReviewPolicy::decide`]) that the engine consults.
//! Everything in this module is testable without a generation capability.

mod engine;

pub use engine::{RunOutcome, WorkflowEngine};

use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// A named unit of work in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Append the pending user input to the conversation.
    ProcessInput,
    /// Classify the latest user message into an intent.
    AnalyzeIntent,
    /// Produce the fixed clarification message for unintelligible input.
    ErrorHandling,
    /// Plain conversational turn.
    Chat,
    /// Generate code from the latest user message.
    CodeGenerate,
    /// Review the current code target and score it.
    CodeReview,
    /// Optimize the current code target using review comments.
    CodeOptimize,
    /// Format the final response and finish the run.
    Output,
}

impl Step {
    /// Get the step name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ProcessInput => "process_input",
            Step::AnalyzeIntent => "analyze_intent",
            Step::ErrorHandling => "error_handling",
            Step::Chat => "chat",
            Step::CodeGenerate => "code_generate",
            Step::CodeReview => "code_review",
            Step::CodeOptimize => "code_optimize",
            Step::Output => "output",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process_input" => Ok(Step::ProcessInput),
            "analyze_intent" => Ok(Step::AnalyzeIntent),
            "error_handling" => Ok(Step::ErrorHandling),
            "chat" => Ok(Step::Chat),
            "code_generate" => Ok(Step::CodeGenerate),
            "code_review" => Ok(Step::CodeReview),
            "code_optimize" => Ok(Step::CodeOptimize),
            "output" => Ok(Step::Output),
            _ => Err(format!("Unknown step: {}", s)),
        }
    }
}

/// Unconditional edges of the workflow graph.
///
/// Steps absent from this table route conditionally: `AnalyzeIntent` via
/// [`route_by_intent`], `CodeReview` via [`ReviewPolicy::decide`], and
/// `Output` is terminal.
pub const STATIC_EDGES: &[(Step, Step)] = &[
    (Step::ProcessInput, Step::AnalyzeIntent),
    (Step::ErrorHandling, Step::Output),
    (Step::Chat, Step::Output),
    (Step::CodeGenerate, Step::CodeReview),
    (Step::CodeOptimize, Step::CodeReview),
];

/// Look up the unconditional successor of a step, if it has one.
pub fn static_successor(step: Step) -> Option<Step> {
    STATIC_EDGES
        .iter()
        .find(|(from, _)| *from == step)
        .map(|(_, to)| *to)
}

/// Route to the step handling the classified intent.
///
/// Total pure function: identical intents always route identically.
pub fn route_by_intent(intent: Intent) -> Step {
    match intent {
        Intent::Review => Step::CodeReview,
        Intent::Optimize => Step::CodeOptimize,
        Intent::Generate => Step::CodeGenerate,
        Intent::Chat => Step::Chat,
        Intent::Unknown => Step::ErrorHandling,
    }
}

/// Review convergence policy deciding whether a scored review passes,
/// force-passes, or loops back to optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewPolicy {
    /// Tiered thresholds: `score >= pass` passes, `score < fail` loops to
    /// optimize (bounded by the optimize ceiling), anything between
    /// force-passes without looping.
    Tiered { pass: u8, fail: u8 },
    /// Single threshold: `score >= threshold` passes, otherwise loop to
    /// optimize until the ceiling force-passes.
    Simple { threshold: u8 },
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        ReviewPolicy::Tiered { pass: 90, fail: 60 }
    }
}

/// Verdict of a review policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    /// Score met the pass criterion.
    Pass,
    /// Loop terminated without a passing score (ceiling or middle band).
    ForcePass,
    /// Loop back to the optimize step.
    Optimize,
}

impl ReviewVerdict {
    /// Whether this verdict ends the review/optimize loop as passed.
    pub fn passed(&self) -> bool {
        !matches!(self, ReviewVerdict::Optimize)
    }
}

impl ReviewPolicy {
    /// Decide the verdict for a review score.
    ///
    /// `optimize_rounds` is the number of optimize steps already executed
    /// this run; once it reaches `max_optimize_rounds` the loop always
    /// force-passes, guaranteeing termination for any score sequence.
    pub fn decide(&self, score: u8, optimize_rounds: u32, max_optimize_rounds: u32) -> ReviewVerdict {
        match *self {
            ReviewPolicy::Simple { threshold } => {
                if score >= threshold {
                    ReviewVerdict::Pass
                } else if optimize_rounds >= max_optimize_rounds {
                    ReviewVerdict::ForcePass
                } else {
                    ReviewVerdict::Optimize
                }
            }
            ReviewPolicy::Tiered { pass, fail } => {
                if score >= pass {
                    ReviewVerdict::Pass
                } else if score >= fail {
                    // Acceptable middle band: stop looping.
                    ReviewVerdict::ForcePass
                } else if optimize_rounds >= max_optimize_rounds {
                    ReviewVerdict::ForcePass
                } else {
                    ReviewVerdict::Optimize
                }
            }
        }
    }
}

/// The mutable fields threaded through a single workflow run, merged into
/// the session when the run completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Intent classified for the current run.
    pub current_intent: Intent,
    /// File referenced by the user, when the classifier extracted one.
    pub filename: Option<String>,
    /// The last-produced code, whatever step produced it.
    pub code_content: Option<String>,
    /// Code produced by the generate step this run.
    pub generated_code: Option<String>,
    /// Code produced by the optimize step this run.
    pub optimized_code: Option<String>,
    /// Comments from the most recent review.
    pub review_comments: String,
    /// Score from the most recent review (0-100).
    pub review_score: u8,
    /// Whether the review/optimize loop ended as passed.
    pub review_passed: bool,
    /// Most recently completed step, driving target selection.
    pub last_step: Option<Step>,
    /// Final user-visible response text.
    pub output: String,
    /// Optimize steps executed this run; monotonic within a run.
    pub optimize_count: u32,
    /// Review steps executed this run; monotonic within a run.
    pub review_count: u32,
    /// User input awaiting processing; cleared by the input step.
    pub pending_input: String,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            current_intent: Intent::Unknown,
            filename: None,
            code_content: None,
            generated_code: None,
            optimized_code: None,
            review_comments: String::new(),
            review_score: 0,
            review_passed: false,
            last_step: None,
            output: String::new(),
            optimize_count: 0,
            review_count: 0,
            pending_input: String::new(),
        }
    }
}

impl WorkflowState {
    /// Reset the per-run fields at the start of a new run.
    ///
    /// Counters, review results, and the per-run code slots start fresh;
    /// `code_content` is kept as cross-turn memory of the last-produced
    /// code.
    pub fn begin_run(&mut self, input: &str) {
        self.current_intent = Intent::Unknown;
        self.generated_code = None;
        self.optimized_code = None;
        self.review_comments.clear();
        self.review_score = 0;
        self.review_passed = false;
        self.output.clear();
        self.optimize_count = 0;
        self.review_count = 0;
        self.pending_input = input.to_string();
    }
}
