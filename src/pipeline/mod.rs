//! Stage pipeline.
//!
//! `Pipeline::advance` repeatedly asks the routing predicate what to do,
//! runs the chosen stage, folds its events into the session and hands them
//! to a [`Journal`] for persistence, until the predicate halts.

pub mod routing;
pub mod stages;

pub use routing::{HaltReason, Route, route};
pub use stages::StageResult;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::{Error, SessionError};
use crate::generators::GuardedGenerator;
use crate::session::{EventRecord, Session};

/// Durable sink for the events a stage produced.
///
/// Called once per stage, after the events have been folded into `session`.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn record(&self, session: &Session, events: &[EventRecord]) -> Result<(), Error>;
}

pub struct Pipeline {
    generator: GuardedGenerator,
    config: EngineConfig,
}

impl Pipeline {
    pub fn new(generator: GuardedGenerator, config: EngineConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run stages until the routing predicate halts.
    ///
    /// On error `session` may hold state that was never journaled; callers
    /// must discard it.
    pub async fn advance(
        &self,
        session: &mut Session,
        journal: &dyn Journal,
    ) -> Result<HaltReason, Error> {
        loop {
            let stage = match route(session) {
                Route::Halt(reason) => {
                    info!(
                        session_id = %session.id,
                        status = %session.status,
                        halt = ?reason,
                        "Pipeline halted"
                    );
                    return Ok(reason);
                }
                Route::Run(stage) => stage,
            };

            info!(session_id = %session.id, %stage, "Running stage");
            let result = stages::run(stage, session, &self.generator, &self.config).await;

            for event in &result.events {
                session.apply(event).map_err(|reason| {
                    error!(session_id = %session.id, %stage, %reason, "Stage output rejected");
                    SessionError::Inconsistent {
                        session_id: session.id.to_string(),
                        reason,
                    }
                })?;
            }

            if !stage.is_satisfied(session) {
                error!(session_id = %session.id, %stage, "Stage made no progress");
                return Err(SessionError::Inconsistent {
                    session_id: session.id.to_string(),
                    reason: format!("stage {stage} made no progress"),
                }
                .into());
            }

            journal.record(session, &result.events).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::error::LlmError;
    use crate::generators::{ContentGenerator, ScoredAnswer};
    use crate::session::{
        Analysis, AnalysisKind, Answer, Prompt, SessionContext, SessionId, SessionKind,
        SessionStatus, Stage,
    };

    struct Offline;

    #[async_trait]
    impl ContentGenerator for Offline {
        async fn generate_questions(
            &self,
            _kind: SessionKind,
            _context: &SessionContext,
            _count: usize,
        ) -> Result<Vec<Prompt>, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "offline".into(),
                reason: "no network".into(),
            })
        }

        async fn score_answer(
            &self,
            _prompt: &Prompt,
            _answer: &Answer,
            _context: &SessionContext,
        ) -> Result<ScoredAnswer, LlmError> {
            Ok(ScoredAnswer {
                feedback: "Feedback: solid\nScore: 9".into(),
                score: Some(9),
            })
        }

        async fn synthesize_summary(&self, _session: &Session) -> Result<String, LlmError> {
            Ok("# Roadmap".into())
        }

        async fn analyze(
            &self,
            kind: AnalysisKind,
            _input: &serde_json::Value,
        ) -> Result<Analysis, LlmError> {
            Ok(Analysis {
                data: serde_json::json!({ "kind": kind.as_str() }),
                score: kind.score_key().map(|_| 60.0),
            })
        }
    }

    /// Records each stage's batch.
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<EventRecord>>>,
    }

    #[async_trait]
    impl Journal for Recorder {
        async fn record(&self, _session: &Session, events: &[EventRecord]) -> Result<(), Error> {
            self.batches.lock().unwrap().push(events.to_vec());
            Ok(())
        }
    }

    fn pipeline() -> Pipeline {
        let generator = GuardedGenerator::new(Arc::new(Offline), Duration::from_secs(1), 5);
        Pipeline::new(generator, EngineConfig::default())
    }

    fn session(kind: SessionKind) -> Session {
        Session::new(
            SessionId::generate(kind),
            "o",
            kind,
            SessionContext::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn new_interview_halts_waiting_for_answers() {
        let p = pipeline();
        let journal = Recorder::default();
        let mut s = session(SessionKind::Interview);

        let halt = p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(halt, HaltReason::WaitForInput);
        assert_eq!(s.status, SessionStatus::InProgress);
        assert_eq!(s.payload.prompts.len(), 3);
        assert_eq!(s.stage, Some(Stage::GeneratePrompts));

        let batches = journal.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].len(), 3);
    }

    #[tokio::test]
    async fn final_answer_runs_through_to_completion() {
        let p = pipeline();
        let journal = Recorder::default();
        let mut s = session(SessionKind::Interview);
        p.advance(&mut s, &journal).await.unwrap();

        let id = s.id.clone();
        for i in 1..=3 {
            s.apply(&EventRecord::answer(&id, i, "answer")).unwrap();
        }
        let halt = p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(halt, HaltReason::Terminal);
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.aggregate_score(), Some(9.0));
        assert_eq!(s.payload.summary.as_deref(), Some("# Roadmap"));
    }

    #[tokio::test]
    async fn advance_on_terminal_session_is_a_no_op() {
        let p = pipeline();
        let journal = Recorder::default();
        let mut s = session(SessionKind::Interview);
        p.advance(&mut s, &journal).await.unwrap();
        let id = s.id.clone();
        for i in 1..=3 {
            s.apply(&EventRecord::answer(&id, i, "answer")).unwrap();
        }
        p.advance(&mut s, &journal).await.unwrap();
        let before = journal.batches.lock().unwrap().len();

        let halt = p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(halt, HaltReason::Terminal);
        assert_eq!(journal.batches.lock().unwrap().len(), before);
    }

    #[tokio::test]
    async fn interrupted_prompt_batch_is_topped_up() {
        let p = pipeline();
        let journal = Recorder::default();
        let mut s = session(SessionKind::Interview);
        let id = s.id.clone();
        s.apply(&EventRecord::system(&id, crate::session::SystemMarker::Started, "hi"))
            .unwrap();
        s.apply(&Prompt::new(1, "Kept from the first attempt").to_event_in_set(&id, 3))
            .unwrap();
        assert_eq!(route(&s), Route::Run(Stage::GeneratePrompts));

        let halt = p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(halt, HaltReason::WaitForInput);
        assert_eq!(s.payload.prompts.len(), 3);
        assert_eq!(s.payload.prompts[0].text, "Kept from the first attempt");
        assert_eq!(s.status, SessionStatus::InProgress);

        let batches = journal.batches.lock().unwrap();
        let ordinals: Vec<_> = batches[0].iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn assessment_runs_every_analysis() {
        let p = pipeline();
        let journal = Recorder::default();
        let mut s = session(SessionKind::Assessment);
        p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(s.payload.prompts.len(), 6);

        let id = s.id.clone();
        for i in 1..=6 {
            s.apply(&EventRecord::answer(&id, i, "choice")).unwrap();
        }
        let halt = p.advance(&mut s, &journal).await.unwrap();
        assert_eq!(halt, HaltReason::Terminal);
        assert_eq!(s.payload.analyses.len(), AnalysisKind::ALL.len());
        assert!(s.payload.ingested);
        assert_eq!(s.aggregate_score(), Some(60.0));
    }
}
