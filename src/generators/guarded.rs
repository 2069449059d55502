//! Timeout + fallback wrapper around a `ContentGenerator`.
//!
//! Every method here is infallible. Failures are logged at `warn` and
//! replaced with content from [`super::fallback`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;
use crate::session::{Analysis, AnalysisKind, Answer, Prompt, Session, SessionContext, SessionKind};

use super::{ContentGenerator, fallback};

/// Feedback text and a score within 0..=10.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scored {
    pub feedback: String,
    pub score: u8,
}

#[derive(Clone)]
pub struct GuardedGenerator {
    inner: Arc<dyn ContentGenerator>,
    timeout: Duration,
    neutral_score: u8,
}

impl GuardedGenerator {
    pub fn new(inner: Arc<dyn ContentGenerator>, timeout: Duration, neutral_score: u8) -> Self {
        Self {
            inner,
            timeout,
            neutral_score: neutral_score.min(10),
        }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                operation: operation.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Exactly `count` prompts. Fewer than `count` usable prompts counts as
    /// a failure; extras are dropped.
    pub async fn questions(
        &self,
        kind: SessionKind,
        context: &SessionContext,
        count: usize,
    ) -> Vec<Prompt> {
        let result = self
            .bounded(
                "generate_questions",
                self.inner.generate_questions(kind, context, count),
            )
            .await;
        match result {
            Ok(mut prompts) if prompts.len() >= count => {
                prompts.truncate(count);
                for (i, prompt) in prompts.iter_mut().enumerate() {
                    prompt.ordinal = i as u32 + 1;
                }
                prompts
            }
            Ok(prompts) => {
                warn!(
                    %kind,
                    got = prompts.len(),
                    wanted = count,
                    "Too few generated questions, using fallback set"
                );
                fallback::questions(kind, count)
            }
            Err(e) => {
                warn!(%kind, error = %e, "Question generation failed, using fallback set");
                fallback::questions(kind, count)
            }
        }
    }

    pub async fn score(&self, prompt: &Prompt, answer: &Answer, context: &SessionContext) -> Scored {
        let result = self
            .bounded(
                "score_answer",
                self.inner.score_answer(prompt, answer, context),
            )
            .await;
        match result {
            Ok(scored) => {
                let feedback = if scored.feedback.trim().is_empty() {
                    fallback::FEEDBACK_UNAVAILABLE.to_string()
                } else {
                    scored.feedback
                };
                let score = scored.score.map_or(self.neutral_score, |s| s.min(10));
                Scored { feedback, score }
            }
            Err(e) => {
                warn!(
                    ordinal = answer.ordinal,
                    error = %e,
                    "Answer scoring failed, using neutral score"
                );
                Scored {
                    feedback: fallback::FEEDBACK_UNAVAILABLE.to_string(),
                    score: self.neutral_score,
                }
            }
        }
    }

    /// Never empty.
    pub async fn summary(&self, session: &Session) -> String {
        let result = self
            .bounded("synthesize_summary", self.inner.synthesize_summary(session))
            .await;
        match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(session_id = %session.id, "Empty summary generated, using placeholder");
                fallback::summary(session)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Summary synthesis failed, using placeholder");
                fallback::summary(session)
            }
        }
    }

    pub async fn analysis(&self, kind: AnalysisKind, input: &serde_json::Value) -> Analysis {
        match self.bounded("analyze", self.inner.analyze(kind, input)).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(analysis = %kind, error = %e, "Analysis failed, using error-marked default");
                fallback::analysis(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::generators::ScoredAnswer;
    use crate::session::SessionId;

    /// Fails every call.
    struct Broken;

    #[async_trait]
    impl ContentGenerator for Broken {
        async fn generate_questions(
            &self,
            _kind: SessionKind,
            _context: &SessionContext,
            _count: usize,
        ) -> Result<Vec<Prompt>, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "broken".into(),
                reason: "down".into(),
            })
        }

        async fn score_answer(
            &self,
            _prompt: &Prompt,
            _answer: &Answer,
            _context: &SessionContext,
        ) -> Result<ScoredAnswer, LlmError> {
            Err(LlmError::AuthFailed {
                provider: "broken".into(),
            })
        }

        async fn synthesize_summary(&self, _session: &Session) -> Result<String, LlmError> {
            Ok("   ".into())
        }

        async fn analyze(
            &self,
            _kind: AnalysisKind,
            _input: &serde_json::Value,
        ) -> Result<Analysis, LlmError> {
            Err(LlmError::RateLimited {
                provider: "broken".into(),
                retry_after: None,
            })
        }
    }

    /// Returns a fixed number of questions, or never answers.
    struct Fixed {
        count: usize,
        hang: bool,
    }

    #[async_trait]
    impl ContentGenerator for Fixed {
        async fn generate_questions(
            &self,
            _kind: SessionKind,
            _context: &SessionContext,
            _count: usize,
        ) -> Result<Vec<Prompt>, LlmError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok((1..=self.count)
                .map(|i| Prompt::new(i as u32, format!("Generated {i}")))
                .collect())
        }

        async fn score_answer(
            &self,
            _prompt: &Prompt,
            _answer: &Answer,
            _context: &SessionContext,
        ) -> Result<ScoredAnswer, LlmError> {
            Ok(ScoredAnswer {
                feedback: "fine".into(),
                score: None,
            })
        }

        async fn synthesize_summary(&self, _session: &Session) -> Result<String, LlmError> {
            Ok("roadmap".into())
        }

        async fn analyze(
            &self,
            _kind: AnalysisKind,
            _input: &serde_json::Value,
        ) -> Result<Analysis, LlmError> {
            Ok(Analysis {
                data: serde_json::json!({}),
                score: Some(50.0),
            })
        }
    }

    fn guard(inner: impl ContentGenerator + 'static) -> GuardedGenerator {
        GuardedGenerator::new(Arc::new(inner), Duration::from_millis(50), 5)
    }

    fn session() -> Session {
        Session::new(
            SessionId::from("interview_g"),
            "o",
            SessionKind::Interview,
            SessionContext::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn failing_generator_yields_fallbacks() {
        let g = guard(Broken);
        let qs = g
            .questions(SessionKind::Interview, &SessionContext::default(), 3)
            .await;
        assert_eq!(qs.len(), 3);
        assert!(qs.iter().all(|q| !q.text.is_empty()));

        let answer = Answer {
            ordinal: 1,
            text: "a".into(),
        };
        let scored = g.score(&qs[0], &answer, &SessionContext::default()).await;
        assert_eq!(scored.score, 5);
        assert!(!scored.feedback.is_empty());

        assert!(!g.summary(&session()).await.trim().is_empty());

        let analysis = g.analysis(AnalysisKind::Skills, &serde_json::json!([])).await;
        assert!(analysis.is_fallback());
    }

    #[tokio::test]
    async fn too_few_questions_falls_back_too_many_truncates() {
        let few = guard(Fixed {
            count: 2,
            hang: false,
        })
        .questions(SessionKind::Interview, &SessionContext::default(), 3)
        .await;
        assert_eq!(few[0].text, "Tell me about yourself.");

        let many = guard(Fixed {
            count: 5,
            hang: false,
        })
        .questions(SessionKind::Interview, &SessionContext::default(), 3)
        .await;
        assert_eq!(many.len(), 3);
        assert_eq!(many[2].text, "Generated 3");
    }

    #[tokio::test]
    async fn hanging_generator_times_out_into_fallback() {
        let qs = guard(Fixed {
            count: 3,
            hang: true,
        })
        .questions(SessionKind::Interview, &SessionContext::default(), 3)
        .await;
        assert_eq!(qs[1].text, "What are your strengths?");
    }

    #[tokio::test]
    async fn missing_score_becomes_neutral() {
        let g = guard(Fixed {
            count: 1,
            hang: false,
        });
        let answer = Answer {
            ordinal: 1,
            text: "a".into(),
        };
        let scored = g
            .score(&Prompt::new(1, "q"), &answer, &SessionContext::default())
            .await;
        assert_eq!(scored.score, 5);
        assert_eq!(scored.feedback, "fine");
    }
}
