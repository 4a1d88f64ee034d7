//! Skill extraction and question generation from a job description.

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::prompts::render_template;
use crate::llm_client::LanguageModel;
use crate::screening::prompts::SKILL_EXTRACTION_PROMPT_TEMPLATE;

/// Upper bound on skills, and therefore questions, per run.
pub const MAX_SKILLS: usize = 5;

/// Skills parsed from the model's reply, plus the reply itself for display.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedSkills {
    pub raw: String,
    pub skills: Vec<String>,
}

/// One skill with its yes/no question and the reference used as evaluation
/// ground truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillProbe {
    pub skill: String,
    pub question: String,
    pub reference: String,
}

/// Asks the model for a comma-separated skill list. A failing model call
/// aborts; an oddly formatted reply is parsed best-effort.
pub async fn extract_skills(
    job_description: &str,
    llm: &dyn LanguageModel,
) -> Result<ExtractedSkills, AppError> {
    let prompt = render_template(
        SKILL_EXTRACTION_PROMPT_TEMPLATE,
        &[("job_description", job_description)],
    );
    let raw = llm
        .complete(&prompt, None)
        .await
        .map_err(|e| AppError::Llm(format!("Skill extraction failed: {e}")))?;

    let skills = parse_skills(&raw);
    if skills.is_empty() {
        warn!("Skill extraction yielded no skills from reply: {raw:?}");
    } else {
        info!("Extracted {} skills: {}", skills.len(), skills.join(", "));
    }

    Ok(ExtractedSkills { raw, skills })
}

/// Splits on commas, trims, drops empty tokens and keeps the first
/// `MAX_SKILLS`.
pub fn parse_skills(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_SKILLS)
        .map(String::from)
        .collect()
}

pub fn question_for(skill: &str) -> String {
    format!("Does the resume mention {skill}?")
}

/// The reference restates the question rather than asserting a fact about
/// the resume, so answer similarity measures wording, not correctness.
pub fn reference_for(skill: &str) -> String {
    format!("Check if {skill} appears in the resume")
}

pub fn build_probes(skills: &[String]) -> Vec<SkillProbe> {
    skills
        .iter()
        .map(|skill| SkillProbe {
            skill: skill.clone(),
            question: question_for(skill),
            reference: reference_for(skill),
        })
        .collect()
}
