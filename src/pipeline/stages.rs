//! Stage bodies. Each turns the current session into the events it produces.

use serde_json::{Value, json};
use tracing::debug;

use crate::config::EngineConfig;
use crate::generators::GuardedGenerator;
use crate::session::{AnalysisKind, EventRecord, Session, SessionKind, Stage, SystemMarker};

/// Output of one stage: the events to fold and persist, in order.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub events: Vec<EventRecord>,
}

pub async fn run(
    stage: Stage,
    session: &Session,
    generator: &GuardedGenerator,
    config: &EngineConfig,
) -> StageResult {
    let id = &session.id;
    let events = match stage {
        Stage::Start => vec![EventRecord::system(id, SystemMarker::Started, welcome(session.kind))],
        Stage::GeneratePrompts => {
            // Only the ordinals not yet issued; an interrupted batch may have
            // left part of the set behind.
            let count = config.question_count(session.kind);
            let issued = session.payload.prompts.len();
            generator
                .questions(session.kind, &session.context, count)
                .await
                .iter()
                .filter(|p| p.ordinal as usize > issued)
                .map(|p| p.to_event_in_set(id, count as u32))
                .collect()
        }
        // Only external answers satisfy the gate.
        Stage::CollectAnswers => Vec::new(),
        Stage::ScoreAnswers => score_unscored(session, generator).await,
        Stage::IngestResponses => vec![EventRecord::system(
            id,
            SystemMarker::Processing,
            "Thank you for completing the assessment. Your responses are being analyzed.",
        )],
        Stage::Synthesize => vec![EventRecord::summary(id, generator.summary(session).await)],
        Stage::Complete => vec![EventRecord::system(
            id,
            SystemMarker::Completed,
            completion(session.kind),
        )],
        analysis_stage => match analysis_stage.analysis_kind() {
            Some(kind) => {
                let input = analysis_input(session, kind);
                let analysis = generator.analysis(kind, &input).await;
                let mut record = EventRecord::analysis(id, kind.as_str(), analysis.data.to_string());
                if let Some(score) = analysis.score {
                    record = record.with_score(score);
                }
                vec![record]
            }
            None => Vec::new(),
        },
    };
    StageResult { stage, events }
}

fn welcome(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Interview => "Welcome to your mock interview. Answer each question in turn.",
        SessionKind::Assessment => {
            "Welcome to your career assessment. Let's start with your background and goals."
        }
    }
}

fn completion(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Interview => "Interview complete. Your learning roadmap is ready.",
        SessionKind::Assessment => {
            "Assessment complete. Your personalized career recommendations are ready."
        }
    }
}

/// Score answers that have no feedback yet, in ordinal order.
async fn score_unscored(session: &Session, generator: &GuardedGenerator) -> Vec<EventRecord> {
    let p = &session.payload;
    let mut events = Vec::new();
    for answer in p.answers.iter().skip(p.feedback.len()) {
        let Some(prompt) = p.prompt(answer.ordinal) else {
            continue;
        };
        let scored = generator.score(prompt, answer, &session.context).await;
        debug!(session_id = %session.id, ordinal = answer.ordinal, score = scored.score, "Answer scored");
        events.push(EventRecord::feedback(
            &session.id,
            answer.ordinal,
            scored.feedback,
            scored.score,
        ));
    }
    events
}

/// Answered prompts whose category passes `keep`.
fn responses(session: &Session, keep: impl Fn(&str) -> bool) -> Value {
    let p = &session.payload;
    let items: Vec<Value> = p
        .answers
        .iter()
        .filter_map(|answer| {
            let prompt = p.prompt(answer.ordinal)?;
            let category = prompt.category.as_deref().unwrap_or("");
            keep(category).then(|| {
                json!({
                    "ordinal": answer.ordinal,
                    "category": category,
                    "question": prompt.text,
                    "answer": answer.text,
                })
            })
        })
        .collect();
    Value::Array(items)
}

fn analysis_data(session: &Session, kind: AnalysisKind) -> Value {
    session
        .payload
        .analyses
        .get(&kind)
        .map(|a| a.data.clone())
        .unwrap_or_else(|| json!({}))
}

/// The input each analysis sees.
pub fn analysis_input(session: &Session, kind: AnalysisKind) -> Value {
    match kind {
        AnalysisKind::Skills => {
            responses(session, |c| matches!(c, "technical" | "soft_skills"))
        }
        AnalysisKind::Aptitude => {
            responses(session, |c| c.to_lowercase().contains("aptitude"))
        }
        AnalysisKind::Interests => responses(session, |c| matches!(c, "interests" | "goals")),
        AnalysisKind::Personality => responses(session, |_| true),
        AnalysisKind::OptionMatches => json!({
            "skills_analysis": analysis_data(session, AnalysisKind::Skills),
            "aptitude_analysis": analysis_data(session, AnalysisKind::Aptitude),
            "interest_analysis": analysis_data(session, AnalysisKind::Interests),
            "personality_analysis": analysis_data(session, AnalysisKind::Personality),
            "user_background": session.context.background,
        }),
        AnalysisKind::SkillGaps => json!({
            "current_skills": analysis_data(session, AnalysisKind::Skills),
            "career_matches": analysis_data(session, AnalysisKind::OptionMatches),
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::session::{Prompt, SessionContext, SessionId};

    fn answered_assessment() -> Session {
        let mut s = Session::new(
            SessionId::from("assessment_s"),
            "o",
            SessionKind::Assessment,
            SessionContext::default().with_background(json!({"education": "B.Tech"})),
            Utc::now(),
        );
        let id = s.id.clone();
        let prompts = [
            Prompt::new(1, "Languages?").with_category("technical"),
            Prompt::new(2, "Teamwork?").with_category("soft_skills"),
            Prompt::new(3, "Puzzle?").with_category("Logical_Aptitude"),
            Prompt::new(4, "Sector?").with_category("interests"),
            Prompt::new(5, "Five-year goal?").with_category("goals"),
            Prompt::new(6, "Introvert?").with_category("personality"),
        ];
        for prompt in &prompts {
            s.apply(&prompt.to_event(&id)).unwrap();
        }
        for i in 1..=6 {
            s.apply(&EventRecord::answer(&id, i, format!("answer {i}"))).unwrap();
        }
        s
    }

    fn ordinals(v: &Value) -> Vec<u64> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r["ordinal"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn analysis_inputs_filter_by_category() {
        let s = answered_assessment();
        assert_eq!(ordinals(&analysis_input(&s, AnalysisKind::Skills)), [1, 2]);
        assert_eq!(ordinals(&analysis_input(&s, AnalysisKind::Aptitude)), [3]);
        assert_eq!(ordinals(&analysis_input(&s, AnalysisKind::Interests)), [4, 5]);
        assert_eq!(
            ordinals(&analysis_input(&s, AnalysisKind::Personality)),
            [1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn option_matching_sees_prior_analyses_and_background() {
        let mut s = answered_assessment();
        let id = s.id.clone();
        s.apply(
            &EventRecord::analysis(&id, "skills", r#"{"skills_score": 70}"#).with_score(70.0),
        )
        .unwrap();
        let input = analysis_input(&s, AnalysisKind::OptionMatches);
        assert_eq!(input["skills_analysis"]["skills_score"], 70);
        assert_eq!(input["aptitude_analysis"], json!({}));
        assert_eq!(input["user_background"]["education"], "B.Tech");
    }
}
