//! Prompt text and response parsing for the LLM-backed generators.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::{AnalysisKind, Answer, Prompt, Session, SessionContext, SessionKind};

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)score:\s*(\d+)").expect("score pattern is valid"));

pub fn questions_system_prompt(kind: SessionKind, count: usize) -> String {
    match kind {
        SessionKind::Interview => format!(
            "You are a technical interviewer. Ask exactly {count} interview questions that best \
             test the candidate's readiness for the given role.\n\n\
             Rules:\n\
             - Most questions are technical deep-dives grounded in the candidate's resume\n\
             - The last question covers technical collaboration on a real project\n\
             - No generic or personality questions\n\n\
             Respond with a JSON object: {{\"questions\": [\"question 1\", \"question 2\"]}}\n\
             ONLY output the JSON object. No other text."
        ),
        SessionKind::Assessment => format!(
            "You are an expert career counselor. Generate exactly {count} career assessment \
             questions covering technical skills, soft skills, aptitude, interests, \
             personality and goals.\n\n\
             Respond with a JSON object:\n\
             {{\"questions\": [{{\"category\": \"technical|soft_skills|aptitude|interests|personality|goals\", \
             \"question\": \"text\", \
             \"options\": [{{\"value\": \"key\", \"label\": \"Display text\"}}]}}]}}\n\
             Use an empty options array for open questions.\n\
             ONLY output the JSON object. No other text."
        ),
    }
}

pub fn questions_user_prompt(kind: SessionKind, context: &SessionContext) -> String {
    match kind {
        SessionKind::Interview => format!(
            "Role: {role}\nCompany: {company}\n\nCandidate resume:\n{resume}",
            role = context.role_or_default(),
            company = context.company_or_default(),
            resume = context.resume_text.as_deref().unwrap_or("(no resume provided)"),
        ),
        SessionKind::Assessment => format!(
            "User background:\n{}",
            serde_json::to_string_pretty(&context.background).unwrap_or_default()
        ),
    }
}

pub const SCORE_SYSTEM_PROMPT: &str = "You are an experienced interviewer. Give constructive \
    feedback on the candidate's answer: what was good and what could be improved.\n\n\
    Format your response as:\n\
    Feedback: <your feedback>\n\
    Score: <0-10>";

pub fn score_user_prompt(prompt: &Prompt, answer: &Answer, context: &SessionContext) -> String {
    format!(
        "Interview for {role} at {company}.\n\nQuestion: {question}\nAnswer: {answer}",
        role = context.role_or_default(),
        company = context.company_or_default(),
        question = prompt.text,
        answer = answer.text,
    )
}

pub fn summary_system_prompt(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Interview => {
            "You are a career coach. From the interview questions, the candidate's answers and \
             the interviewer feedback, write a personalized learning roadmap in Markdown: \
             strengths, gaps, and a week-by-week plan with concrete resources."
        }
        SessionKind::Assessment => {
            "You are a career counselor. From the career matches, skills gaps and background, \
             write actionable recommendations in Markdown: a primary career path with \
             reasoning, immediate next steps, medium-term goals, a long-term vision and \
             learning resources."
        }
    }
}

pub fn summary_user_prompt(session: &Session) -> String {
    match session.kind {
        SessionKind::Interview => {
            let mut out = format!(
                "Role: {} at {}\n",
                session.context.role_or_default(),
                session.context.company_or_default()
            );
            let p = &session.payload;
            for prompt in &p.prompts {
                let answer = p.answer(prompt.ordinal).map_or("", |a| a.text.as_str());
                out.push_str(&format!(
                    "\nQ{n}: {q}\nA{n}: {answer}\n",
                    n = prompt.ordinal,
                    q = prompt.text
                ));
                if let Some(fb) = p.feedback.iter().find(|f| f.ordinal == prompt.ordinal) {
                    out.push_str(&format!("Feedback ({}/10): {}\n", fb.score, fb.text));
                }
            }
            out
        }
        SessionKind::Assessment => {
            let data = |kind: AnalysisKind| {
                session
                    .payload
                    .analyses
                    .get(&kind)
                    .map(|a| a.data.clone())
                    .unwrap_or(serde_json::Value::Null)
            };
            let input = serde_json::json!({
                "career_matches": data(AnalysisKind::OptionMatches),
                "skills_gaps": data(AnalysisKind::SkillGaps),
                "user_background": session.context.background,
            });
            serde_json::to_string_pretty(&input).unwrap_or_default()
        }
    }
}

pub fn analysis_system_prompt(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Skills => {
            "You are an expert skills assessor. Identify the user's technical and soft skills \
             from their responses. Return JSON: {\"technical_skills\": [{\"skill\", \
             \"proficiency\", \"evidence\"}], \"soft_skills\": [...], \"skills_score\": 0-100, \
             \"strengths\": [], \"areas_for_improvement\": []}"
        }
        AnalysisKind::Aptitude => {
            "Assess the user's aptitude: logical reasoning, analytical thinking, quantitative \
             and verbal skills. Return JSON: {\"aptitude_areas\": {}, \"aptitude_score\": \
             0-100, \"learning_style\": \"\", \"cognitive_strengths\": [], \
             \"development_areas\": []}"
        }
        AnalysisKind::Interests => {
            "Analyze the user's career interests and work preferences. Return JSON: \
             {\"industry_interests\": [], \"work_preferences\": {}, \"career_values\": [], \
             \"interest_score\": 0-100, \"top_interests\": []}"
        }
        AnalysisKind::Personality => {
            "Analyze personality traits that influence career fit. Return JSON: \
             {\"personality_traits\": {}, \"personality_type\": \"\", \
             \"communication_style\": \"\", \"ideal_work_culture\": \"\", \
             \"personality_score\": 0-100}"
        }
        AnalysisKind::OptionMatches => {
            "Match the analyzed profile with suitable career paths. Return JSON: \
             {\"career_matches\": [{\"career_title\", \"field\", \"match_score\", \
             \"reasoning\", \"required_skills\": []}], \"top_3_recommendations\": [], \
             \"alternative_paths\": []}"
        }
        AnalysisKind::SkillGaps => {
            "Compare the user's current skills with the requirements of their top career \
             matches. Return JSON: {\"skills_gaps\": [{\"career_title\", \
             \"matching_skills\": [], \"missing_skills\": [], \"gap_score\", \
             \"readiness_level\"}], \"overall_readiness\": \"\"}"
        }
    }
}

pub const JSON_ONLY: &str = "ONLY output the JSON object. No other text.";

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    // Fenced code block, with or without a language tag
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse a `Score: N` marker, clamped to 0..=10.
pub fn parse_score(text: &str) -> Option<u8> {
    let caps = SCORE_RE.captures(text)?;
    let raw: u64 = caps.get(1)?.as_str().parse().ok()?;
    Some(raw.min(10) as u8)
}

/// Feedback text without the `Feedback:` label and trailing score line.
pub fn strip_feedback(text: &str) -> String {
    let body = match SCORE_RE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    let body = body.trim();
    body.strip_prefix("Feedback:")
        .or_else(|| body.strip_prefix("feedback:"))
        .unwrap_or(body)
        .trim()
        .to_string()
}
