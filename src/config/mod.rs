use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::workflow::ReviewPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub generation: GenerationConfig,
    pub request: RequestConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
    pub database: Option<DatabaseConfig>,
}

/// Text-generation endpoint configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Temperature for conversational and code-producing calls.
    pub chat_temperature: f32,
    /// Temperature for classification and review calls.
    pub analysis_temperature: f32,
}

/// Optional durable checkpoint database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Workflow engine configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Review convergence policy (tiered or simple threshold).
    pub policy: ReviewPolicy,
    /// Optimize rounds permitted before the loop force-passes.
    pub max_optimize_rounds: u32,
    /// Hard per-run step budget across the whole graph.
    pub step_budget: u32,
    /// Chat history length beyond which truncation kicks in.
    pub history_limit: usize,
    /// Non-system messages retained when truncating.
    pub history_keep_recent: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_key = env::var("GENERATION_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .map_err(|_| AppError::Config {
                message: "GENERATION_API_KEY (or OPENAI_API_KEY) is required".to_string(),
            })?;

        let generation = GenerationConfig {
            api_key,
            base_url: env::var("GENERATION_BASE_URL")
                .or_else(|_| env::var("OPENAI_BASE_URL"))
                .unwrap_or_else(|_| "https://api.siliconflow.cn/v1".to_string()),
            model: env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "deepseek-ai/DeepSeek-V3.1-Terminus".to_string()),
            chat_temperature: env::var("CHAT_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.7),
            analysis_temperature: env::var("ANALYSIS_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        };

        let database = env::var("DATABASE_PATH").ok().map(|path| DatabaseConfig {
            path: PathBuf::from(path),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        });

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let policy = match env::var("REVIEW_POLICY")
            .unwrap_or_else(|_| "tiered".to_string())
            .to_lowercase()
            .as_str()
        {
            "simple" => ReviewPolicy::Simple {
                threshold: env::var("REVIEW_PASS_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(80),
            },
            _ => ReviewPolicy::Tiered {
                pass: env::var("REVIEW_TIER_PASS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(90),
                fail: env::var("REVIEW_TIER_FAIL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        };

        let workflow = WorkflowConfig {
            policy,
            max_optimize_rounds: env::var("MAX_OPTIMIZE_ROUNDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            step_budget: env::var("STEP_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            history_limit: 10,
            history_keep_recent: 8,
        };

        Ok(Config {
            generation,
            request,
            workflow,
            logging,
            database,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            policy: ReviewPolicy::default(),
            max_optimize_rounds: 3,
            step_budget: 50,
            history_limit: 10,
            history_keep_recent: 8,
        }
    }
}
