//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Tests use #[serial] to prevent race
//! conditions with shared env vars.

use codeflow_assistant::config::{Config, LogFormat};
use codeflow_assistant::workflow::ReviewPolicy;
use serial_test::serial;
use std::env;

const ALL_VARS: &[&str] = &[
    "GENERATION_API_KEY",
    "OPENAI_API_KEY",
    "GENERATION_BASE_URL",
    "OPENAI_BASE_URL",
    "GENERATION_MODEL",
    "CHAT_TEMPERATURE",
    "ANALYSIS_TEMPERATURE",
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
    "REVIEW_POLICY",
    "REVIEW_PASS_THRESHOLD",
    "REVIEW_TIER_PASS",
    "REVIEW_TIER_FAIL",
    "MAX_OPTIMIZE_ROUNDS",
    "STEP_BUDGET",
];

fn clean_env() {
    for var in ALL_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");

    let config = Config::from_env().unwrap();

    assert_eq!(config.generation.api_key, "test-key");
    assert_eq!(config.generation.base_url, "https://api.siliconflow.cn/v1");
    assert_eq!(
        config.generation.model,
        "deepseek-ai/DeepSeek-V3.1-Terminus"
    );
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.request.max_retries, 3);
    assert_eq!(config.workflow.policy, ReviewPolicy::Tiered { pass: 90, fail: 60 });
    assert_eq!(config.workflow.max_optimize_rounds, 3);
    assert_eq!(config.workflow.step_budget, 50);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.database.is_none());

    clean_env();
}

#[test]
#[serial]
fn test_config_missing_api_key_fails() {
    clean_env();

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("GENERATION_API_KEY"));
}

#[test]
#[serial]
fn test_config_openai_fallback_vars() {
    clean_env();
    env::set_var("OPENAI_API_KEY", "legacy-key");
    env::set_var("OPENAI_BASE_URL", "https://legacy.example/v1");

    let config = Config::from_env().unwrap();
    assert_eq!(config.generation.api_key, "legacy-key");
    assert_eq!(config.generation.base_url, "https://legacy.example/v1");

    clean_env();
}

#[test]
#[serial]
fn test_config_simple_review_policy() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");
    env::set_var("REVIEW_POLICY", "simple");
    env::set_var("REVIEW_PASS_THRESHOLD", "75");

    let config = Config::from_env().unwrap();
    assert_eq!(config.workflow.policy, ReviewPolicy::Simple { threshold: 75 });

    clean_env();
}

#[test]
#[serial]
fn test_config_tiered_thresholds_override() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");
    env::set_var("REVIEW_TIER_PASS", "85");
    env::set_var("REVIEW_TIER_FAIL", "50");
    env::set_var("MAX_OPTIMIZE_ROUNDS", "5");

    let config = Config::from_env().unwrap();
    assert_eq!(config.workflow.policy, ReviewPolicy::Tiered { pass: 85, fail: 50 });
    assert_eq!(config.workflow.max_optimize_rounds, 5);

    clean_env();
}

#[test]
#[serial]
fn test_config_database_opt_in() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    let database = config.database.expect("database should be configured");
    assert_eq!(database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(database.max_connections, 10);

    clean_env();
}

#[test]
#[serial]
fn test_config_json_log_format() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    clean_env();
}

#[test]
#[serial]
fn test_config_invalid_numbers_fall_back_to_defaults() {
    clean_env();
    env::set_var("GENERATION_API_KEY", "test-key");
    env::set_var("REQUEST_TIMEOUT_MS", "not-a-number");
    env::set_var("STEP_BUDGET", "fifty");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.workflow.step_budget, 50);

    clean_env();
}
