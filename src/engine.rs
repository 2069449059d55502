//! Session workflow engine: the operations exposed to callers.
//!
//! Every operation that reads or changes a session does so while holding
//! that session's lock, in this order: cache lookup, reconstruction on a
//! miss, stage execution, event append, registry update, cache write.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::cache::SessionCache;
use crate::config::EngineConfig;
use crate::error::{Error, Result, SessionError};
use crate::generators::{ContentGenerator, GuardedGenerator};
use crate::locks::SessionLocks;
use crate::pipeline::{Journal, Pipeline};
use crate::reconstruct::reconstruct;
use crate::session::{
    Analysis, AnalysisKind, Answer, Event, EventRecord, Feedback, Prompt, Session, SessionContext,
    SessionId, SessionKind, SessionStatus, Stage, SystemMarker,
};
use crate::store::{SessionRecord, SessionStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: SessionId,
    pub prompts: Vec<Prompt>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: SessionStatus,
    pub next_prompt_ordinal: Option<u32>,
    pub aggregate_score: Option<f64>,
    pub completed: bool,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartResponse {
    pub status: SessionStatus,
}

/// Full view of one session's current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub owner_id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub stage: Option<Stage>,
    pub context: SessionContext,
    pub prompts: Vec<Prompt>,
    pub answers: Vec<Answer>,
    pub feedback: Vec<Feedback>,
    pub analyses: BTreeMap<AnalysisKind, Analysis>,
    pub summary: Option<String>,
    pub total_score: Option<f64>,
    pub aggregate_score: Option<f64>,
    pub next_prompt_ordinal: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id.clone(),
            owner_id: s.owner_id.clone(),
            kind: s.kind,
            status: s.status,
            stage: s.stage,
            context: s.context.clone(),
            prompts: s.payload.prompts.clone(),
            answers: s.payload.answers.clone(),
            feedback: s.payload.feedback.clone(),
            analyses: s.payload.analyses.clone(),
            summary: s.payload.summary.clone(),
            total_score: s.total_score(),
            aggregate_score: s.aggregate_score(),
            next_prompt_ordinal: s.next_prompt_ordinal(),
            created_at: s.created_at,
            updated_at: s.updated_at,
            completed_at: s.completed_at,
        }
    }
}

/// One row of an owner's session list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub role: Option<String>,
    pub company: Option<String>,
    pub total_score: Option<f64>,
    pub aggregate_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SessionRecord> for SessionSummary {
    fn from(r: SessionRecord) -> Self {
        Self {
            session_id: r.id,
            kind: r.kind,
            status: r.status,
            role: r.context.role,
            company: r.context.company,
            total_score: r.total_score,
            aggregate_score: r.aggregate_score,
            created_at: r.created_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
        }
    }
}

/// Score statistics over an owner's sessions of one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerAnalytics {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    /// Mean aggregate score of completed sessions.
    pub average_score: Option<f64>,
    pub best_score: Option<f64>,
}

/// Appends a stage's events, then updates the registry record.
struct StoreJournal<'a> {
    store: &'a dyn SessionStore,
}

#[async_trait]
impl Journal for StoreJournal<'_> {
    async fn record(&self, session: &Session, events: &[EventRecord]) -> Result<()> {
        self.store.append_all(events).await?;
        self.store.update(&SessionRecord::from(session)).await?;
        Ok(())
    }
}

pub struct Engine {
    store: Arc<dyn SessionStore>,
    pipeline: Pipeline,
    cache: Arc<SessionCache>,
    locks: SessionLocks,
}

impl Engine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn ContentGenerator>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let guarded =
            GuardedGenerator::new(generator, config.generator_timeout, config.neutral_score);
        Ok(Self {
            cache: SessionCache::new(config.cache_capacity),
            locks: SessionLocks::new(config.lock_wait),
            pipeline: Pipeline::new(guarded, config),
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        self.pipeline.config()
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    fn journal(&self) -> StoreJournal<'_> {
        StoreJournal {
            store: self.store.as_ref(),
        }
    }

    /// Cached session, or one rebuilt from the log. Caller holds the lock.
    async fn load(&self, id: &SessionId) -> Result<Session> {
        if let Some(session) = self.cache.get(id).await {
            return Ok(session);
        }
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                session_id: id.to_string(),
            })?;
        let events = self.store.list_by_session(id).await?;
        let session = reconstruct(&record, &events)?;
        debug!(session_id = %id, events = events.len(), status = %session.status, "Session reconstructed");
        Ok(session)
    }

    /// Drop a possibly half-written cache entry after a failed operation.
    async fn discard_on_error<T>(&self, id: &SessionId, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            match e.as_session() {
                Some(se) if se.is_validation() || se.is_retryable() => {}
                _ => {
                    error!(session_id = %id, error = %e, "Session operation failed");
                    self.cache.evict(id).await;
                }
            }
        }
        result
    }

    /// Create a session and run it up to its first input gate.
    pub async fn start_session(
        &self,
        kind: SessionKind,
        owner_id: &str,
        context: SessionContext,
    ) -> Result<StartResponse> {
        let id = SessionId::generate(kind);
        let _guard = self.locks.acquire(&id).await?;

        let result = async {
            let mut session = Session::new(id.clone(), owner_id, kind, context, Utc::now());
            self.store.create(&SessionRecord::from(&session)).await?;
            self.pipeline.advance(&mut session, &self.journal()).await?;
            self.cache.put(session.clone()).await;
            Ok::<_, Error>(session)
        }
        .await;
        let session = self.discard_on_error(&id, result).await?;

        info!(
            session_id = %id,
            %kind,
            owner_id,
            prompts = session.payload.prompts.len(),
            "Session started"
        );
        Ok(StartResponse {
            session_id: id,
            prompts: session.payload.prompts,
            status: session.status,
        })
    }

    /// Record the answer for `ordinal`, then advance as far as possible.
    pub async fn submit_answer(
        &self,
        id: &SessionId,
        ordinal: u32,
        text: &str,
    ) -> Result<SubmitResponse> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyAnswer.into());
        }
        let _guard = self.locks.acquire(id).await?;

        let result = async {
            let mut session = self.load(id).await?;
            validate_answer(&session, ordinal)?;

            let record = EventRecord::answer(id, ordinal, text);
            session
                .apply(&record)
                .map_err(|reason| SessionError::Inconsistent {
                    session_id: id.to_string(),
                    reason,
                })?;
            self.journal().record(&session, &[record]).await?;
            info!(session_id = %id, ordinal, "Answer recorded");

            self.pipeline.advance(&mut session, &self.journal()).await?;
            self.cache.put(session.clone()).await;
            Ok::<_, Error>(session)
        }
        .await;
        let session = self.discard_on_error(id, result).await?;

        let completed = session.status == SessionStatus::Completed;
        Ok(SubmitResponse {
            status: session.status,
            next_prompt_ordinal: session.next_prompt_ordinal(),
            aggregate_score: session.aggregate_score(),
            completed,
            summary: completed.then(|| session.payload.summary.clone()).flatten(),
        })
    }

    /// Current state of a session, reconstructing it if it is not cached.
    pub async fn get_session_state(&self, id: &SessionId) -> Result<SessionView> {
        let _guard = self.locks.acquire(id).await?;
        let result = async {
            let session = self.load(id).await?;
            self.cache.put(session.clone()).await;
            Ok::<_, Error>(session)
        }
        .await;
        let session = self.discard_on_error(id, result).await?;
        Ok(SessionView::from(&session))
    }

    /// Return the session to `started`, clearing its payload. Earlier events
    /// stay in the log.
    pub async fn restart_session(&self, id: &SessionId) -> Result<RestartResponse> {
        let _guard = self.locks.acquire(id).await?;
        let result = async {
            let mut session = self.load(id).await?;
            let record = EventRecord::system(id, SystemMarker::Reset, "Session reset");
            session
                .apply(&record)
                .map_err(|reason| SessionError::Inconsistent {
                    session_id: id.to_string(),
                    reason,
                })?;
            self.journal().record(&session, &[record]).await?;
            self.cache.put(session.clone()).await;
            Ok::<_, Error>(session)
        }
        .await;
        let session = self.discard_on_error(id, result).await?;

        info!(session_id = %id, "Session restarted");
        Ok(RestartResponse {
            status: session.status,
        })
    }

    /// Advance without new input: issues fresh prompts after a restart, or
    /// finishes stages interrupted by a crash.
    pub async fn continue_session(&self, id: &SessionId) -> Result<StartResponse> {
        let _guard = self.locks.acquire(id).await?;
        let result = async {
            let mut session = self.load(id).await?;
            self.pipeline.advance(&mut session, &self.journal()).await?;
            self.cache.put(session.clone()).await;
            Ok::<_, Error>(session)
        }
        .await;
        let session = self.discard_on_error(id, result).await?;

        Ok(StartResponse {
            session_id: session.id,
            prompts: session.payload.prompts,
            status: session.status,
        })
    }

    /// An owner's sessions, newest first.
    pub async fn list_sessions(&self, owner_id: &str) -> Result<Vec<SessionSummary>> {
        let records = self.store.list_by_owner(owner_id).await?;
        Ok(records.into_iter().map(SessionSummary::from).collect())
    }

    /// The raw log, including events from before any restart.
    pub async fn session_history(&self, id: &SessionId) -> Result<Vec<Event>> {
        if self.store.get(id).await?.is_none() {
            return Err(SessionError::NotFound {
                session_id: id.to_string(),
            }
            .into());
        }
        Ok(self.store.list_by_session(id).await?)
    }

    pub async fn owner_analytics(&self, owner_id: &str, kind: SessionKind) -> Result<OwnerAnalytics> {
        let records: Vec<_> = self
            .store
            .list_by_owner(owner_id)
            .await?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        Ok(analytics(&records))
    }
}

fn validate_answer(session: &Session, ordinal: u32) -> std::result::Result<(), SessionError> {
    let session_id = session.id.to_string();
    let prompt_count = session.payload.prompts.len();
    if session.status == SessionStatus::Completed {
        return Err(SessionError::AlreadyCompleted { session_id });
    }
    if session.status != SessionStatus::InProgress {
        return Err(SessionError::NotAcceptingAnswers {
            session_id,
            status: session.status,
        });
    }
    if ordinal == 0 || ordinal as usize > prompt_count {
        return Err(SessionError::InvalidOrdinal {
            session_id,
            ordinal,
            prompt_count,
        });
    }
    let expected = session.payload.answers.len() as u32 + 1;
    if ordinal != expected {
        return Err(SessionError::OutOfOrder {
            session_id,
            ordinal,
            expected,
        });
    }
    Ok(())
}

fn analytics(records: &[SessionRecord]) -> OwnerAnalytics {
    let completed: Vec<f64> = records
        .iter()
        .filter(|r| r.status == SessionStatus::Completed)
        .filter_map(|r| r.aggregate_score)
        .collect();
    let completed_count = records
        .iter()
        .filter(|r| r.status == SessionStatus::Completed)
        .count();
    let in_progress = records
        .iter()
        .filter(|r| matches!(r.status, SessionStatus::InProgress | SessionStatus::Processing))
        .count();
    OwnerAnalytics {
        total: records.len(),
        completed: completed_count,
        in_progress,
        average_score: (!completed.is_empty())
            .then(|| completed.iter().sum::<f64>() / completed.len() as f64),
        best_score: completed.iter().copied().reduce(f64::max),
    }
}
