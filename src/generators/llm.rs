//! LLM-backed content generator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::session::{
    Analysis, AnalysisKind, Answer, ChoiceOption, Prompt, Session, SessionContext, SessionKind,
};

use super::prompts::{self, extract_json_object, parse_score, strip_feedback};
use super::{ContentGenerator, ScoredAnswer};

/// Generates questions, feedback, analyses and summaries with an LLM.
pub struct LlmGenerator {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Generator completion"
        );
        Ok(response.content)
    }

    fn invalid(&self, reason: impl Into<String>) -> LlmError {
        LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason: reason.into(),
        }
    }

    fn parse_object(&self, content: &str) -> Result<serde_json::Value, LlmError> {
        let json = extract_json_object(content)
            .ok_or_else(|| self.invalid("no JSON object in response"))?;
        let value: serde_json::Value = serde_json::from_str(json)?;
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
struct QuestionList {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

/// Questions come back either as bare strings or as objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuestion {
    Text(String),
    Structured {
        #[serde(alias = "text")]
        question: String,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
}

impl RawQuestion {
    fn into_prompt(self, ordinal: u32) -> Prompt {
        match self {
            Self::Text(text) => Prompt::new(ordinal, text.trim()),
            Self::Structured {
                question,
                category,
                options,
            } => {
                let mut prompt = Prompt::new(ordinal, question.trim()).with_options(options);
                prompt.category = category;
                prompt
            }
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate_questions(
        &self,
        kind: SessionKind,
        context: &SessionContext,
        count: usize,
    ) -> Result<Vec<Prompt>, LlmError> {
        let content = self
            .ask(
                &prompts::questions_system_prompt(kind, count),
                prompts::questions_user_prompt(kind, context),
            )
            .await?;
        let json = extract_json_object(&content)
            .ok_or_else(|| self.invalid("no JSON object in question list"))?;
        let list: QuestionList = serde_json::from_str(json)?;

        Ok(list
            .questions
            .into_iter()
            .map(|q| q.into_prompt(0))
            .filter(|p| !p.text.is_empty())
            .enumerate()
            .map(|(i, mut p)| {
                p.ordinal = i as u32 + 1;
                p
            })
            .collect())
    }

    async fn score_answer(
        &self,
        prompt: &Prompt,
        answer: &Answer,
        context: &SessionContext,
    ) -> Result<ScoredAnswer, LlmError> {
        let content = self
            .ask(
                prompts::SCORE_SYSTEM_PROMPT,
                prompts::score_user_prompt(prompt, answer, context),
            )
            .await?;
        Ok(ScoredAnswer {
            feedback: strip_feedback(&content),
            score: parse_score(&content),
        })
    }

    async fn synthesize_summary(&self, session: &Session) -> Result<String, LlmError> {
        let content = self
            .ask(
                prompts::summary_system_prompt(session.kind),
                prompts::summary_user_prompt(session),
            )
            .await?;
        Ok(content.trim().to_string())
    }

    async fn analyze(
        &self,
        kind: AnalysisKind,
        input: &serde_json::Value,
    ) -> Result<Analysis, LlmError> {
        let system = format!(
            "{}\n{}",
            prompts::analysis_system_prompt(kind),
            prompts::JSON_ONLY
        );
        let user = format!(
            "Analyze these responses:\n{}",
            serde_json::to_string_pretty(input)?
        );
        let content = self.ask(&system, user).await?;
        let data = self.parse_object(&content)?;
        let score = kind
            .score_key()
            .map(|key| data.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0).clamp(0.0, 100.0));
        Ok(Analysis { data, score })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::provider::{CompletionResponse, FinishReason};

    /// Replies with canned responses in order.
    struct Scripted {
        replies: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self.replies.lock().unwrap().pop().unwrap_or_default();
            Ok(CompletionResponse {
                content,
                input_tokens: 1,
                output_tokens: 1,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn parses_plain_question_list() {
        let llm = Scripted::new(&[r#"```json
{"questions": ["How would you shard Postgres?", "  ", "Walk me through a deploy."]}
```"#]);
        let generator = LlmGenerator::new(llm);
        let qs = generator
            .generate_questions(SessionKind::Interview, &SessionContext::default(), 3)
            .await
            .unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].ordinal, 2);
        assert_eq!(qs[1].text, "Walk me through a deploy.");
    }

    #[tokio::test]
    async fn parses_structured_assessment_questions() {
        let llm = Scripted::new(&[r#"{"questions": [
            {"category": "interests", "question": "Preferred sector?", "type": "multiple_choice",
             "options": [{"value": "tech", "label": "Technology"}]}
        ]}"#]);
        let generator = LlmGenerator::new(llm);
        let qs = generator
            .generate_questions(SessionKind::Assessment, &SessionContext::default(), 1)
            .await
            .unwrap();
        assert_eq!(qs[0].category.as_deref(), Some("interests"));
        assert_eq!(qs[0].options[0].label, "Technology");
    }

    #[tokio::test]
    async fn garbage_question_list_is_an_error() {
        let generator = LlmGenerator::new(Scripted::new(&["I cannot help with that."]));
        let result = generator
            .generate_questions(SessionKind::Interview, &SessionContext::default(), 3)
            .await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn score_answer_extracts_feedback_and_score() {
        let generator =
            LlmGenerator::new(Scripted::new(&["Feedback: Good depth.\nScore: 8"]));
        let scored = generator
            .score_answer(
                &Prompt::new(1, "Q"),
                &Answer {
                    ordinal: 1,
                    text: "A".into(),
                },
                &SessionContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(scored.feedback, "Good depth.");
        assert_eq!(scored.score, Some(8));
    }

    #[tokio::test]
    async fn analysis_score_is_clamped() {
        let generator = LlmGenerator::new(Scripted::new(&[r#"{"skills_score": 140}"#]));
        let analysis = generator
            .analyze(AnalysisKind::Skills, &serde_json::json!([]))
            .await
            .unwrap();
        assert_eq!(analysis.score, Some(100.0));
        assert!(!analysis.is_fallback());
    }
}
