//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::session::SessionKind;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model used for every generator capability.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Workflow engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of prompts issued (and answers required) per interview.
    pub interview_question_count: usize,
    /// Number of prompts issued (and responses required) per assessment.
    pub assessment_question_count: usize,
    /// Upper bound for a single content-generator call.
    pub generator_timeout: Duration,
    /// How long a trigger waits for the per-session lock before giving up.
    pub lock_wait: Duration,
    /// Maximum number of sessions held in the process-local cache.
    pub cache_capacity: usize,
    /// Score assigned when an answer cannot be scored.
    pub neutral_score: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interview_question_count: 3,
            assessment_question_count: 6,
            generator_timeout: Duration::from_secs(60),
            lock_wait: Duration::from_secs(5),
            cache_capacity: 1024,
            neutral_score: 5,
        }
    }
}

impl EngineConfig {
    /// Build from `CAREER_COACH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            interview_question_count: env_parse(
                "CAREER_COACH_INTERVIEW_QUESTIONS",
                defaults.interview_question_count,
            )?,
            assessment_question_count: env_parse(
                "CAREER_COACH_ASSESSMENT_QUESTIONS",
                defaults.assessment_question_count,
            )?,
            generator_timeout: Duration::from_secs(env_parse(
                "CAREER_COACH_GENERATOR_TIMEOUT_SECS",
                defaults.generator_timeout.as_secs(),
            )?),
            lock_wait: Duration::from_secs(env_parse(
                "CAREER_COACH_LOCK_WAIT_SECS",
                defaults.lock_wait.as_secs(),
            )?),
            cache_capacity: env_parse("CAREER_COACH_CACHE_CAPACITY", defaults.cache_capacity)?,
            neutral_score: defaults.neutral_score,
        };
        config.validate()?;
        Ok(config)
    }

    /// Prompts issued per session of `kind`.
    pub fn question_count(&self, kind: SessionKind) -> usize {
        match kind {
            SessionKind::Interview => self.interview_question_count,
            SessionKind::Assessment => self.assessment_question_count,
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interview_question_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "interview_question_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.assessment_question_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "assessment_question_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.neutral_score > 10 {
            return Err(ConfigError::InvalidValue {
                key: "neutral_score".to_string(),
                message: "must be within 0-10".to_string(),
            });
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("CAREER_COACH_DB_PATH")
            .unwrap_or_else(|_| "./data/career-coach.db".to_string());
        Self {
            db_path: PathBuf::from(db_path),
        }
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
