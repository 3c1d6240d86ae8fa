use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {thread_id}")]
    SessionNotFound { thread_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Checkpoint encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-generation service errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Workflow step errors.
///
/// These are reported to the user as the run's output text; they never
/// abort a run - every run reaches the output step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no code available to {operation}")]
    MissingCodeTarget { operation: &'static str },

    #[error("code content is empty")]
    EmptyCode,

    #[error("file {path} does not exist")]
    FileNotFound { path: String },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type alias for workflow step operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::SessionNotFound {
            thread_id: "thread-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: thread-123");

        let err = StorageError::Query {
            message: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Query failed: syntax error");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Generation service unavailable: server down (retries: 3)"
        );

        let err = GenerationError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = GenerationError::InvalidResponse {
            message: "malformed JSON".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid response: malformed JSON");

        let err = GenerationError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_workflow_error_display() {
        let err = WorkflowError::MissingCodeTarget {
            operation: "review",
        };
        assert_eq!(err.to_string(), "no code available to review");

        let err = WorkflowError::EmptyCode;
        assert_eq!(err.to_string(), "code content is empty");

        let err = WorkflowError::FileNotFound {
            path: "main.py".to_string(),
        };
        assert_eq!(err.to_string(), "file main.py does not exist");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::SessionNotFound {
            thread_id: "test-123".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_generation_error_conversion_to_app_error() {
        let generation_err = GenerationError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = generation_err.into();
        assert!(matches!(app_err, AppError::Generation(_)));
    }

    #[test]
    fn test_workflow_error_conversion_to_app_error() {
        let workflow_err = WorkflowError::EmptyCode;
        let app_err: AppError = workflow_err.into();
        assert!(matches!(app_err, AppError::Workflow(_)));
    }

    #[test]
    fn test_encoding_error_conversion_to_storage_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let storage_err: StorageError = json_err.into();
        assert!(matches!(storage_err, StorageError::Encoding(_)));
    }
}
