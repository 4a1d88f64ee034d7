// All LLM prompt constants for the screening module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Skill extraction prompt. Replace `{job_description}` before sending.
pub const SKILL_EXTRACTION_PROMPT_TEMPLATE: &str = r#"
Extract a list of concrete technical skills, tools, or frameworks
from the following job description.
Return ONLY a comma-separated list.

Job Description:
{job_description}
"#;

/// Retrieval query for one question. The job description rides along so
/// retrieval and answering both see the role context.
pub const QUESTION_QUERY_TEMPLATE: &str = r#"
Job Description:
{job_description}

Question:
{question}
"#;

/// Answer template. Replace `{question}` (the full query) and `{context}`.
pub const ANSWER_PROMPT_TEMPLATE: &str = r#"
You are an assistant for analyzing resume contents.

{question}

Resume Context:
{context}

Rules:
- Answer strictly in ONE line
- Answer ONLY as: "Yes — <quoted evidence>" OR "No — not mentioned"
- Do NOT explain
- Do NOT infer
"#;

/// System instruction for whole-resume analysis against a job description.
pub const ANALYSIS_SYSTEM: &str = r#"
You are an AI Resume Analysis Engine.
Compare the resume context with the job description and respond ONLY in VALID JSON.
DO NOT add commentary, markdown, or code fences.
If information is missing, set the field to null.

The JSON MUST follow this schema:

{
  "match_score": number (0-100),
  "strengths": string[],
  "weaknesses": string[],
  "missing_skills": string[],
  "insights": string
}
"#;

/// Analysis user prompt. Replace `{job_description}` and `{resume_context}`.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"
Job Description:
{job_description}

Resume Context:
{resume_context}
"#;
