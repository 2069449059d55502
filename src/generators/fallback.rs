//! Deterministic stand-in content used whenever a generator call fails.

use crate::session::{Analysis, AnalysisKind, ChoiceOption, Prompt, Session, SessionKind};

const INTERVIEW_BANK: &[&str] = &[
    "Tell me about yourself.",
    "What are your strengths?",
    "Why do you want this role?",
];

/// Exactly `count` prompts for `kind`, numbered from 1.
pub fn questions(kind: SessionKind, count: usize) -> Vec<Prompt> {
    match kind {
        SessionKind::Interview => (1..=count)
            .map(|i| match INTERVIEW_BANK.get(i - 1) {
                Some(text) => Prompt::new(i as u32, *text),
                None => Prompt::new(i as u32, format!("Interview question {i}")),
            })
            .collect(),
        SessionKind::Assessment => {
            let bank = assessment_bank();
            (1..=count)
                .map(|i| match bank.get(i - 1) {
                    Some(prompt) => prompt.clone(),
                    None => Prompt::new(i as u32, format!("Assessment question {i}"))
                        .with_category("goals"),
                })
                .collect()
        }
    }
}

fn options(pairs: &[(&str, &str)]) -> Vec<ChoiceOption> {
    pairs
        .iter()
        .map(|(value, label)| ChoiceOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect()
}

fn assessment_bank() -> Vec<Prompt> {
    vec![
        Prompt::new(1, "Which of the following technical areas interests you most?")
            .with_category("technical")
            .with_options(options(&[
                ("programming", "Programming & Software Development"),
                ("data_analysis", "Data Analysis & Analytics"),
                ("design", "Design & User Experience"),
                ("marketing", "Digital Marketing"),
                ("other", "Other"),
            ])),
        Prompt::new(2, "Describe a time you had to explain something complex to someone else.")
            .with_category("soft_skills"),
        Prompt::new(3, "How do you usually approach an unfamiliar problem?")
            .with_category("aptitude")
            .with_options(options(&[
                ("systematic", "Break it into steps and work through them"),
                ("intuitive", "Try an idea quickly and iterate"),
                ("collaborative", "Discuss it with others first"),
                ("research", "Research how others solved it"),
            ])),
        Prompt::new(4, "What type of work environment do you prefer?")
            .with_category("interests")
            .with_options(options(&[
                ("startup", "Fast-paced startup"),
                ("corporate", "Structured corporate"),
                ("government", "Government/Public sector"),
                ("nonprofit", "Non-profit organization"),
                ("freelance", "Freelance/Remote"),
            ])),
        Prompt::new(5, "In a team, which role do you naturally take?")
            .with_category("personality")
            .with_options(options(&[
                ("leader", "I take the lead"),
                ("supporter", "I support and coordinate"),
                ("specialist", "I go deep on my own part"),
                ("mediator", "I keep the group aligned"),
            ])),
        Prompt::new(6, "What is your primary career goal?")
            .with_category("goals")
            .with_options(options(&[
                ("salary", "High salary potential"),
                ("balance", "Work-life balance"),
                ("impact", "Social impact"),
                ("creativity", "Innovation & creativity"),
                ("security", "Job security"),
            ])),
    ]
}

pub const FEEDBACK_UNAVAILABLE: &str =
    "Automated feedback is unavailable for this answer. It has been given a neutral score.";

/// Placeholder document for when synthesis fails.
pub fn summary(session: &Session) -> String {
    match session.kind {
        SessionKind::Interview => format!(
            "# Learning roadmap unavailable\n\n\
             A personalized roadmap for {role} at {company} could not be generated right now. \
             Review the feedback on each of your {n} answers and revisit the topics scored \
             below 7 first.",
            role = session.context.role_or_default(),
            company = session.context.company_or_default(),
            n = session.payload.answers.len(),
        ),
        SessionKind::Assessment => "# Recommendations unavailable\n\n\
             Personalized career recommendations could not be generated right now. \
             Your responses and analyses have been saved; review the individual analyses \
             for your strongest areas."
            .to_string(),
    }
}

/// Error-marked default analysis. Dimension analyses score 0.
pub fn analysis(kind: AnalysisKind) -> Analysis {
    let noun = match kind {
        AnalysisKind::Skills => "skills",
        AnalysisKind::Aptitude => "aptitude",
        AnalysisKind::Interests => "interests",
        AnalysisKind::Personality => "personality",
        AnalysisKind::OptionMatches => "career matches",
        AnalysisKind::SkillGaps => "skills gaps",
    };
    Analysis {
        data: serde_json::json!({ "error": format!("Failed to analyze {noun}") }),
        score: kind.score_key().map(|_| 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interview_bank_fills_to_count() {
        let qs = questions(SessionKind::Interview, 5);
        assert_eq!(qs.len(), 5);
        assert_eq!(qs[0].text, "Tell me about yourself.");
        assert_eq!(qs[4].text, "Interview question 5");
        assert!(qs.iter().enumerate().all(|(i, q)| q.ordinal == i as u32 + 1));
    }

    #[test]
    fn interview_bank_truncates() {
        let qs = questions(SessionKind::Interview, 2);
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].text, "What are your strengths?");
    }

    #[test]
    fn assessment_bank_covers_every_category() {
        let qs = questions(SessionKind::Assessment, 6);
        let categories: Vec<_> = qs.iter().filter_map(|q| q.category.as_deref()).collect();
        assert_eq!(
            categories,
            [
                "technical",
                "soft_skills",
                "aptitude",
                "interests",
                "personality",
                "goals"
            ]
        );
        assert!(qs.iter().all(|q| !q.text.is_empty()));
    }

    #[test]
    fn failed_analysis_is_error_marked() {
        let a = analysis(AnalysisKind::Aptitude);
        assert!(a.is_fallback());
        assert_eq!(a.score, Some(0.0));
        assert_eq!(a.data["error"], "Failed to analyze aptitude");

        let gaps = analysis(AnalysisKind::SkillGaps);
        assert!(gaps.score.is_none());
    }
}
