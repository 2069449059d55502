//! Pipeline stages and the per-kind transition tables.

use serde::{Deserialize, Serialize};

use super::model::{AnalysisKind, Session, SessionKind};

/// One step of a session pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    GeneratePrompts,
    CollectAnswers,
    ScoreAnswers,
    IngestResponses,
    AnalyzeSkills,
    AnalyzeAptitude,
    AnalyzeInterests,
    AnalyzePersonality,
    MatchOptions,
    IdentifyGaps,
    Synthesize,
    Complete,
}

use Stage::*;

const INTERVIEW_PIPELINE: &[Stage] = &[
    Start,
    GeneratePrompts,
    CollectAnswers,
    ScoreAnswers,
    Synthesize,
    Complete,
];

const ASSESSMENT_PIPELINE: &[Stage] = &[
    Start,
    GeneratePrompts,
    CollectAnswers,
    IngestResponses,
    AnalyzeSkills,
    AnalyzeAptitude,
    AnalyzeInterests,
    AnalyzePersonality,
    MatchOptions,
    IdentifyGaps,
    Synthesize,
    Complete,
];

impl SessionKind {
    /// The ordered stage table for this kind.
    pub fn pipeline(&self) -> &'static [Stage] {
        match self {
            SessionKind::Interview => INTERVIEW_PIPELINE,
            SessionKind::Assessment => ASSESSMENT_PIPELINE,
        }
    }
}

impl Stage {
    /// The stage that only external input can satisfy.
    pub fn is_input_gate(&self) -> bool {
        matches!(self, CollectAnswers)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Complete)
    }

    /// The analysis an `Analyze*`/`MatchOptions`/`IdentifyGaps` stage produces.
    pub fn analysis_kind(&self) -> Option<AnalysisKind> {
        match self {
            AnalyzeSkills => Some(AnalysisKind::Skills),
            AnalyzeAptitude => Some(AnalysisKind::Aptitude),
            AnalyzeInterests => Some(AnalysisKind::Interests),
            AnalyzePersonality => Some(AnalysisKind::Personality),
            MatchOptions => Some(AnalysisKind::OptionMatches),
            IdentifyGaps => Some(AnalysisKind::SkillGaps),
            _ => None,
        }
    }

    /// Whether this stage's output is already present in the session.
    pub fn is_satisfied(&self, session: &Session) -> bool {
        let p = &session.payload;
        match self {
            Start => p.started,
            GeneratePrompts => p.prompts_complete(),
            CollectAnswers => p.answers_complete(),
            ScoreAnswers => !p.answers.is_empty() && p.feedback.len() >= p.answers.len(),
            IngestResponses => p.ingested,
            Synthesize => p.summary.is_some(),
            Complete => session.completed_at.is_some(),
            stage => stage
                .analysis_kind()
                .is_some_and(|k| p.analyses.contains_key(&k)),
        }
    }

    /// Furthest stage of `session`'s pipeline whose predecessors are all
    /// satisfied along with itself.
    pub fn position(session: &Session) -> Option<Stage> {
        session
            .kind
            .pipeline()
            .iter()
            .take_while(|stage| stage.is_satisfied(session))
            .last()
            .copied()
    }

    /// Next stage in `kind`'s table.
    pub fn next_in(&self, kind: SessionKind) -> Option<Stage> {
        let table = kind.pipeline();
        let index = table.iter().position(|s| s == self)?;
        table.get(index + 1).copied()
    }

    /// Check if a transition from `self` to `target` is valid for `kind`.
    pub fn can_transition_to(&self, kind: SessionKind, target: Stage) -> bool {
        self.next_in(kind) == Some(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Start => "start",
            GeneratePrompts => "generate_prompts",
            CollectAnswers => "collect_answers",
            ScoreAnswers => "score_answers",
            IngestResponses => "ingest_responses",
            AnalyzeSkills => "analyze_skills",
            AnalyzeAptitude => "analyze_aptitude",
            AnalyzeInterests => "analyze_interests",
            AnalyzePersonality => "analyze_personality",
            MatchOptions => "match_options",
            IdentifyGaps => "identify_gaps",
            Synthesize => "synthesize",
            Complete => "complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
