//! Storage collaborator traits: the append-only Event Log and the mutable
//! Session Registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::session::{Event, EventRecord, Session, SessionContext, SessionId, SessionKind, SessionStatus};

/// The registry's view of a session: identity, context and headline numbers.
///
/// Prompts, answers and feedback live only in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub owner_id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub context: SessionContext,
    pub total_score: Option<f64>,
    pub aggregate_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            owner_id: session.owner_id.clone(),
            kind: session.kind,
            status: session.status,
            context: session.context.clone(),
            total_score: session.total_score(),
            aggregate_score: session.aggregate_score(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            completed_at: session.completed_at,
        }
    }
}

/// Durable, append-only, per-session ordered event storage.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event, assigning it an id and the next sequence number.
    async fn append(&self, record: &EventRecord) -> Result<Event, DatabaseError>;

    /// Append a stage's events in order, all or nothing: after an error none
    /// of `records` is visible. Every record must belong to the same session.
    async fn append_all(&self, records: &[EventRecord]) -> Result<Vec<Event>, DatabaseError>;

    /// All events of a session in sequence order.
    async fn list_by_session(&self, session_id: &SessionId) -> Result<Vec<Event>, DatabaseError>;
}

/// Durable mutable record per session.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> Result<(), DatabaseError>;

    async fn update(&self, record: &SessionRecord) -> Result<(), DatabaseError>;

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, DatabaseError>;

    /// An owner's sessions, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<SessionRecord>, DatabaseError>;
}

/// A backend providing both collaborators.
pub trait SessionStore: EventLog + SessionRegistry {}

impl<T: EventLog + SessionRegistry> SessionStore for T {}
