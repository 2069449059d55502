//! LLM integration.
//!
//! A single OpenAI-compatible HTTP backend sits behind the `LlmProvider`
//! trait, so the content generators and the tests can swap in any
//! implementation.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::{ConfigError, LlmError};

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f32,
}

impl LlmConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `CAREER_COACH_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;
        Ok(Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: SecretString::from(api_key),
            model: std::env::var("CAREER_COACH_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: 0.7,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.base_url.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "openai_compat".to_string(),
            reason: "base URL is empty".to_string(),
        });
    }
    tracing::info!(model = %config.model, base_url = %config.base_url, "Using OpenAI-compatible provider");
    Ok(Arc::new(OpenAiCompatProvider::new(
        &config.base_url,
        config.api_key.clone(),
        &config.model,
    )))
}
