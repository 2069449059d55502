//! Content generators: the four capabilities the pipeline delegates to.
//!
//! `LlmGenerator` implements them against an `LlmProvider`. Pipeline stages
//! never call it directly; they go through `GuardedGenerator`, which bounds
//! every call with a timeout and substitutes the deterministic content from
//! [`fallback`] on any failure.

pub mod fallback;
pub mod guarded;
pub mod llm;
pub mod prompts;

pub use guarded::GuardedGenerator;
pub use llm::LlmGenerator;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::session::{Analysis, AnalysisKind, Answer, Prompt, Session, SessionContext, SessionKind};

/// Raw scoring output. `score` is `None` when the generator gave no usable score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAnswer {
    pub feedback: String,
    pub score: Option<u8>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Up to `count` prompts for a new session of `kind`.
    async fn generate_questions(
        &self,
        kind: SessionKind,
        context: &SessionContext,
        count: usize,
    ) -> Result<Vec<Prompt>, LlmError>;

    async fn score_answer(
        &self,
        prompt: &Prompt,
        answer: &Answer,
        context: &SessionContext,
    ) -> Result<ScoredAnswer, LlmError>;

    /// The closing document: a learning roadmap or career recommendations.
    async fn synthesize_summary(&self, session: &Session) -> Result<String, LlmError>;

    async fn analyze(
        &self,
        kind: AnalysisKind,
        input: &serde_json::Value,
    ) -> Result<Analysis, LlmError>;
}
