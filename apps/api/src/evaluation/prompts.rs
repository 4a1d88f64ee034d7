// Judge prompts for the evaluation module.

/// Reverse-question prompt for answer relevancy. Replace `{answer}`,
/// `{context}` and `{count}` before sending.
pub const RELEVANCY_PROMPT_TEMPLATE: &str = r#"Generate {count} different questions that the given answer would answer, using the context for background.
Also identify whether the answer is noncommittal. Set "noncommittal" to true if the answer is evasive, vague or ambiguous (for example "I don't know" or "I'm not sure"), and false otherwise. A clear negative such as "No — not mentioned" is committal.

Return a JSON object with this EXACT schema:
{"questions": ["..."], "noncommittal": false}

Context:
{context}

Answer:
{answer}
"#;
