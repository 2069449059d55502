//! Error types for the session workflow engine.

use std::time::Duration;

use crate::session::SessionStatus;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl Error {
    /// The session error, if this is one.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
///
/// These never escape the generator guard: every content-generation failure
/// is replaced by fallback content before it reaches a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Generator call {operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Workflow errors surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {session_id} not found")]
    NotFound { session_id: String },

    #[error("Ordinal {ordinal} is out of range for session {session_id} ({prompt_count} prompts)")]
    InvalidOrdinal {
        session_id: String,
        ordinal: u32,
        prompt_count: usize,
    },

    #[error("Ordinal {ordinal} submitted for session {session_id}, expected {expected}")]
    OutOfOrder {
        session_id: String,
        ordinal: u32,
        expected: u32,
    },

    #[error("Session {session_id} is already completed")]
    AlreadyCompleted { session_id: String },

    #[error("Session {session_id} is not accepting answers (status {status})")]
    NotAcceptingAnswers {
        session_id: String,
        status: SessionStatus,
    },

    #[error("Answer text must not be empty")]
    EmptyAnswer,

    #[error("Session {session_id} is inconsistent: {reason}")]
    Inconsistent { session_id: String, reason: String },

    #[error("Session {session_id} is busy, gave up after {waited:?}")]
    Busy { session_id: String, waited: Duration },
}

impl SessionError {
    /// Rejected trigger; no state was mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidOrdinal { .. }
                | Self::OutOfOrder { .. }
                | Self::AlreadyCompleted { .. }
                | Self::NotAcceptingAnswers { .. }
                | Self::EmptyAnswer
        )
    }

    /// The caller may retry the same trigger later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
