//! Session data model.
//!
//! A `Session` is never mutated directly: every change arrives as an
//! `EventRecord` folded in through [`Session::apply`]. The live pipeline and
//! the reconstructor share that fold, so a cached session and one rebuilt
//! from the log are always identical.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{EventRecord, EventType, SystemMarker};
use super::stage::Stage;

/// Opaque, externally visible session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh identifier, prefixed with the session kind.
    pub fn generate(kind: SessionKind) -> Self {
        Self(format!("{}_{}", kind, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which workflow a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Interview,
    Assessment,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interview => "interview",
            Self::Assessment => "assessment",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview" => Ok(Self::Interview),
            "assessment" => Ok(Self::Assessment),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

/// Session lifecycle status.
///
/// Progresses Started → InProgress → Processing → Completed; only a restart
/// moves it back to Started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    InProgress,
    Processing,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Started
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "in_progress" => Ok(Self::InProgress),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Caller-supplied context handed to the content generators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_text: Option<String>,
    /// Free-form background for assessments (education, goals, constraints).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub background: serde_json::Value,
}

impl SessionContext {
    pub fn interview(role: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            company: Some(company.into()),
            ..Default::default()
        }
    }

    pub fn with_resume(mut self, resume_text: impl Into<String>) -> Self {
        self.resume_text = Some(resume_text.into());
        self
    }

    pub fn with_background(mut self, background: serde_json::Value) -> Self {
        self.background = background;
        self
    }

    pub fn role_or_default(&self) -> &str {
        self.role.as_deref().unwrap_or("the role")
    }

    pub fn company_or_default(&self) -> &str {
        self.company.as_deref().unwrap_or("the company")
    }
}

/// One selectable option of a multiple-choice prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
}

/// A generated prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub ordinal: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
}

impl Prompt {
    pub fn new(ordinal: u32, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
            category: None,
            options: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_options(mut self, options: Vec<ChoiceOption>) -> Self {
        self.options = options;
        self
    }

    /// Encode as a `question` event of a set of `total` prompts.
    pub fn to_event_in_set(&self, session_id: &SessionId, total: u32) -> EventRecord {
        let mut record = self.to_event(session_id);
        let mut metadata = record.metadata.take().unwrap_or_else(|| serde_json::json!({}));
        metadata["total"] = serde_json::json!(total);
        record.with_metadata(metadata)
    }

    /// Encode as a `question` event.
    pub fn to_event(&self, session_id: &SessionId) -> EventRecord {
        let mut record = EventRecord::question(session_id, self.ordinal, &self.text);
        if let Some(ref category) = self.category {
            record = record.with_category(category);
        }
        if !self.options.is_empty() {
            record = record.with_metadata(serde_json::json!({ "options": self.options }));
        }
        record
    }

    fn from_event(record: &EventRecord, ordinal: u32) -> Self {
        let options = record
            .metadata
            .as_ref()
            .and_then(|m| m.get("options"))
            .and_then(|o| serde_json::from_value(o.clone()).ok())
            .unwrap_or_default();
        Self {
            ordinal,
            text: record.content.clone(),
            category: record.category.clone(),
            options,
        }
    }
}

/// A submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub ordinal: u32,
    pub text: String,
}

/// Scored feedback for one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub ordinal: u32,
    pub text: String,
    /// Within 0..=10.
    pub score: u8,
}

/// The structured analyses produced by the assessment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Skills,
    Aptitude,
    Interests,
    Personality,
    OptionMatches,
    SkillGaps,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 6] = [
        Self::Skills,
        Self::Aptitude,
        Self::Interests,
        Self::Personality,
        Self::OptionMatches,
        Self::SkillGaps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skills => "skills",
            Self::Aptitude => "aptitude",
            Self::Interests => "interests",
            Self::Personality => "personality",
            Self::OptionMatches => "option_matches",
            Self::SkillGaps => "skill_gaps",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Key under which the analysis reports its 0-100 dimension score.
    pub fn score_key(&self) -> Option<&'static str> {
        match self {
            Self::Skills => Some("skills_score"),
            Self::Aptitude => Some("aptitude_score"),
            Self::Interests => Some("interest_score"),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Analysis {
    /// Whether the generator failed and this is the error-marked default.
    pub fn is_fallback(&self) -> bool {
        self.data.get("error").is_some()
    }
}

/// Kind-specific accumulated workflow data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub started: bool,
    pub prompts: Vec<Prompt>,
    /// Size of the prompt set, as declared by its question events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_total: Option<u32>,
    pub answers: Vec<Answer>,
    pub feedback: Vec<Feedback>,
    /// Set once an assessment's responses have been ingested for analysis.
    pub ingested: bool,
    pub analyses: BTreeMap<AnalysisKind, Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Payload {
    /// The whole prompt set has been issued. Question events without a
    /// declared total count as a complete set.
    pub fn prompts_complete(&self) -> bool {
        !self.prompts.is_empty()
            && self
                .prompt_total
                .is_none_or(|total| self.prompts.len() >= total as usize)
    }

    /// All prompts of a complete set have an answer.
    pub fn answers_complete(&self) -> bool {
        self.prompts_complete() && self.answers.len() >= self.prompts.len()
    }

    pub fn answer(&self, ordinal: u32) -> Option<&Answer> {
        self.answers.iter().find(|a| a.ordinal == ordinal)
    }

    pub fn prompt(&self, ordinal: u32) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.ordinal == ordinal)
    }
}

/// One run of a guided workflow for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub owner_id: String,
    pub kind: SessionKind,
    pub context: SessionContext,
    pub status: SessionStatus,
    /// Furthest pipeline stage whose output is present.
    pub stage: Option<Stage>,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        owner_id: impl Into<String>,
        kind: SessionKind,
        context: SessionContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            kind,
            context,
            status: SessionStatus::Started,
            stage: None,
            payload: Payload::default(),
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    /// Fold one event into the session.
    ///
    /// Returns an error describing the inconsistency when the event cannot
    /// follow the current state (ordinal gaps, completion without summary).
    pub fn apply(&mut self, record: &EventRecord) -> Result<(), String> {
        match record.event_type {
            EventType::System => self.apply_marker(record)?,
            EventType::Question => {
                let ordinal = require_ordinal(record)?;
                let expected = self.payload.prompts.len() as u32 + 1;
                if ordinal != expected {
                    return Err(format!(
                        "question ordinal {ordinal} does not follow {} prompts",
                        expected - 1
                    ));
                }
                if let Some(total) = declared_total(record)? {
                    self.payload.prompt_total = Some(total);
                }
                self.payload.prompts.push(Prompt::from_event(record, ordinal));
            }
            EventType::Answer => {
                let ordinal = require_ordinal(record)?;
                if ordinal as usize > self.payload.prompts.len() {
                    return Err(format!(
                        "answer ordinal {ordinal} exceeds {} prompts",
                        self.payload.prompts.len()
                    ));
                }
                let answer = Answer {
                    ordinal,
                    text: record.content.clone(),
                };
                place(&mut self.payload.answers, ordinal, answer, "answer")?;
            }
            EventType::Feedback => {
                let ordinal = require_ordinal(record)?;
                if ordinal as usize > self.payload.answers.len() {
                    return Err(format!("feedback for unanswered ordinal {ordinal}"));
                }
                let feedback = Feedback {
                    ordinal,
                    text: record.content.clone(),
                    score: record.score.unwrap_or(0.0).clamp(0.0, 10.0).round() as u8,
                };
                place(&mut self.payload.feedback, ordinal, feedback, "feedback")?;
            }
            EventType::Analysis => {
                let name = record.category.as_deref().unwrap_or_default();
                let kind = AnalysisKind::parse(name)
                    .ok_or_else(|| format!("unknown analysis {name:?}"))?;
                let data = serde_json::from_str(&record.content)
                    .unwrap_or_else(|_| serde_json::Value::String(record.content.clone()));
                self.payload.analyses.insert(
                    kind,
                    Analysis {
                        data,
                        score: record.score,
                    },
                );
            }
            EventType::Summary => {
                self.payload.summary = Some(record.content.clone());
            }
        }
        self.updated_at = record.created_at;
        self.refresh();
        Ok(())
    }

    fn apply_marker(&mut self, record: &EventRecord) -> Result<(), String> {
        let Some(marker) = record.marker() else {
            // Informational system events carry no state.
            return Ok(());
        };
        match marker {
            SystemMarker::Started => self.payload.started = true,
            SystemMarker::Processing => self.payload.ingested = true,
            SystemMarker::Completed => {
                if !self.payload.answers_complete() {
                    return Err("completion recorded before all answers".to_string());
                }
                if self.payload.summary.as_deref().is_none_or(|s| s.trim().is_empty()) {
                    return Err("completion recorded without a summary".to_string());
                }
                self.completed_at = Some(record.created_at);
            }
            SystemMarker::Reset => {
                self.payload = Payload {
                    started: true,
                    ..Payload::default()
                };
                self.completed_at = None;
            }
        }
        Ok(())
    }

    /// Re-derive status and stage position from the payload.
    fn refresh(&mut self) {
        self.status = if self.completed_at.is_some() {
            SessionStatus::Completed
        } else if self.payload.answers_complete() {
            SessionStatus::Processing
        } else if self.payload.prompts_complete() {
            SessionStatus::InProgress
        } else {
            SessionStatus::Started
        };
        self.stage = Stage::position(self);
    }

    /// Number of answers this session needs before it can be scored.
    pub fn required_answers(&self) -> usize {
        self.payload.prompts.len()
    }

    /// Ordinal the next submission must carry, while answers are open.
    pub fn next_prompt_ordinal(&self) -> Option<u32> {
        if self.status == SessionStatus::InProgress {
            Some(self.payload.answers.len() as u32 + 1)
        } else {
            None
        }
    }

    /// Sum of the scores backing the aggregate, once all are available.
    pub fn total_score(&self) -> Option<f64> {
        match self.kind {
            SessionKind::Interview => {
                let p = &self.payload;
                if p.prompts.is_empty() || p.feedback.len() < p.prompts.len() {
                    return None;
                }
                Some(p.feedback.iter().map(|f| f64::from(f.score)).sum())
            }
            SessionKind::Assessment => self.dimension_scores().map(|s| s.iter().sum()),
        }
    }

    /// Interview: mean answer score (0-10). Assessment: mean of the skills,
    /// aptitude and interest scores (0-100).
    pub fn aggregate_score(&self) -> Option<f64> {
        match self.kind {
            SessionKind::Interview => self
                .total_score()
                .map(|total| total / self.payload.prompts.len() as f64),
            SessionKind::Assessment => self
                .dimension_scores()
                .map(|s| s.iter().sum::<f64>() / s.len() as f64),
        }
    }

    fn dimension_scores(&self) -> Option<Vec<f64>> {
        [AnalysisKind::Skills, AnalysisKind::Aptitude, AnalysisKind::Interests]
            .iter()
            .map(|k| {
                self.payload
                    .analyses
                    .get(k)
                    .map(|a| a.score.unwrap_or(0.0))
            })
            .collect()
    }
}

fn require_ordinal(record: &EventRecord) -> Result<u32, String> {
    match record.ordinal {
        Some(o) if o >= 1 => Ok(o),
        _ => Err(format!("{} event without a valid ordinal", record.event_type)),
    }
}

/// Set slot `ordinal` (1-based) of a dense list: append the next slot or
/// overwrite an existing one. Skipping a slot is an inconsistency.
/// The `total` a question event declares for its prompt set.
fn declared_total(record: &EventRecord) -> Result<Option<u32>, String> {
    let Some(total) = record.metadata.as_ref().and_then(|m| m.get("total")) else {
        return Ok(None);
    };
    total
        .as_u64()
        .and_then(|t| u32::try_from(t).ok())
        .filter(|t| *t > 0)
        .map(Some)
        .ok_or_else(|| format!("invalid prompt total {total}"))
}

fn place<T>(slots: &mut Vec<T>, ordinal: u32, value: T, what: &str) -> Result<(), String> {
    let index = ordinal as usize - 1;
    if index < slots.len() {
        slots[index] = value;
        Ok(())
    } else if index == slots.len() {
        slots.push(value);
        Ok(())
    } else {
        Err(format!(
            "{what} ordinal {ordinal} skips slot {}",
            slots.len() + 1
        ))
    }
}
