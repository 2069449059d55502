//! Event vocabulary for the append-only session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::SessionId;

/// What an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Question,
    Answer,
    Feedback,
    Analysis,
    Summary,
    System,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Answer => "answer",
            Self::Feedback => "feedback",
            Self::Analysis => "analysis",
            Self::Summary => "summary",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(Self::Question),
            "answer" => Ok(Self::Answer),
            "feedback" => Ok(Self::Feedback),
            "analysis" => Ok(Self::Analysis),
            "summary" => Ok(Self::Summary),
            "system" => Ok(Self::System),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRole {
    System,
    User,
    Generator,
}

impl EventRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Generator => "generator",
        }
    }
}

impl std::fmt::Display for EventRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "generator" => Ok(Self::Generator),
            other => Err(format!("unknown event role: {other}")),
        }
    }
}

/// Lifecycle markers carried by `system` events in their `category` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMarker {
    Started,
    Processing,
    Completed,
    Reset,
}

impl SystemMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Reset => "reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// An event as produced by a stage, before the log assigns it an id and a
/// sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: SessionId,
    pub event_type: EventType,
    pub role: EventRole,
    pub content: String,
    /// 1-based prompt/answer/feedback slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Prompt category, analysis name, or system marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    fn new(
        session_id: &SessionId,
        event_type: EventType,
        role: EventRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.clone(),
            event_type,
            role,
            content: content.into(),
            ordinal: None,
            score: None,
            category: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(session_id: &SessionId, marker: SystemMarker, content: impl Into<String>) -> Self {
        let mut record = Self::new(session_id, EventType::System, EventRole::System, content);
        record.category = Some(marker.as_str().to_string());
        record
    }

    pub fn question(session_id: &SessionId, ordinal: u32, text: impl Into<String>) -> Self {
        Self::new(session_id, EventType::Question, EventRole::Generator, text).with_ordinal(ordinal)
    }

    pub fn answer(session_id: &SessionId, ordinal: u32, text: impl Into<String>) -> Self {
        Self::new(session_id, EventType::Answer, EventRole::User, text).with_ordinal(ordinal)
    }

    pub fn feedback(session_id: &SessionId, ordinal: u32, text: impl Into<String>, score: u8) -> Self {
        let mut record =
            Self::new(session_id, EventType::Feedback, EventRole::Generator, text).with_ordinal(ordinal);
        record.score = Some(f64::from(score));
        record
    }

    pub fn analysis(session_id: &SessionId, name: &str, content: impl Into<String>) -> Self {
        Self::new(session_id, EventType::Analysis, EventRole::Generator, content).with_category(name)
    }

    pub fn summary(session_id: &SessionId, text: impl Into<String>) -> Self {
        Self::new(session_id, EventType::Summary, EventRole::Generator, text)
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The lifecycle marker, if this is a `system` event carrying one.
    pub fn marker(&self) -> Option<SystemMarker> {
        if self.event_type != EventType::System {
            return None;
        }
        self.category.as_deref().and_then(SystemMarker::parse)
    }
}

/// An event as stored in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Strictly increasing per session.
    pub sequence: i64,
    #[serde(flatten)]
    pub record: EventRecord,
}
