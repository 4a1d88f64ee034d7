//! Answer chain — retrieve resume context for a question, prompt the model,
//! return its raw one-line answer. `AnswerVerdict` checks the answer shape
//! after the fact.

use serde::Serialize;
use tracing::debug;

use crate::errors::AppError;
use crate::llm_client::prompts::render_template;
use crate::llm_client::LanguageModel;
use crate::retrieval::{Retriever, ScoredChunk};
use crate::screening::prompts::{ANSWER_PROMPT_TEMPLATE, QUESTION_QUERY_TEMPLATE};

const NOT_MENTIONED: &str = "not mentioned";

/// Raw model answer and the chunks it was conditioned on.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub answer: String,
    pub contexts: Vec<ScoredChunk>,
}

impl ChainOutput {
    pub fn context_texts(&self) -> Vec<String> {
        self.contexts.iter().map(|c| c.chunk.text.clone()).collect()
    }
}

pub struct AnswerChain<'a> {
    retriever: Retriever<'a>,
    llm: &'a dyn LanguageModel,
}

impl<'a> AnswerChain<'a> {
    pub fn new(retriever: Retriever<'a>, llm: &'a dyn LanguageModel) -> Self {
        Self { retriever, llm }
    }

    /// Retrieves context for `query`, fills the answer template and returns
    /// the model's text unmodified.
    pub async fn run(&self, query: &str) -> Result<ChainOutput, AppError> {
        let contexts = self.retriever.retrieve(query).await?;
        let prompt = render_answer_prompt(query, &contexts);
        let answer = self
            .llm
            .complete(&prompt, None)
            .await
            .map_err(|e| AppError::Llm(format!("Answer generation failed: {e}")))?;

        debug!("Answer ({} contexts): {}", contexts.len(), answer.trim());
        Ok(ChainOutput { answer, contexts })
    }
}

pub fn build_query(job_description: &str, question: &str) -> String {
    render_template(
        QUESTION_QUERY_TEMPLATE,
        &[("job_description", job_description), ("question", question)],
    )
}

pub fn render_answer_prompt(query: &str, contexts: &[ScoredChunk]) -> String {
    let context = contexts
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    render_template(
        ANSWER_PROMPT_TEMPLATE,
        &[("question", query), ("context", context.as_str())],
    )
}

/// Classification of an answer against the `Yes — <evidence>` /
/// `No — not mentioned` contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AnswerVerdict {
    Yes { evidence: String },
    No,
    NonConforming,
}

impl AnswerVerdict {
    /// Lenient parse: tolerates surrounding whitespace, a hyphen or en dash
    /// instead of the em dash, and any letter case on Yes/No. Multi-line
    /// answers and anything else are non-conforming.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains('\n') {
            return AnswerVerdict::NonConforming;
        }

        if let Some(rest) = strip_keyword(trimmed, "yes") {
            let evidence = rest.trim();
            if evidence.is_empty() {
                return AnswerVerdict::NonConforming;
            }
            return AnswerVerdict::Yes {
                evidence: evidence.to_string(),
            };
        }

        if let Some(rest) = strip_keyword(trimmed, "no") {
            if rest.trim().trim_end_matches('.').eq_ignore_ascii_case(NOT_MENTIONED) {
                return AnswerVerdict::No;
            }
        }

        AnswerVerdict::NonConforming
    }

    /// The canonical one-line form, if the answer could be classified.
    pub fn canonical(&self) -> Option<String> {
        match self {
            AnswerVerdict::Yes { evidence } => Some(format!("Yes — {evidence}")),
            AnswerVerdict::No => Some(format!("No — {NOT_MENTIONED}")),
            AnswerVerdict::NonConforming => None,
        }
    }
}

/// True when `raw` already is exactly the canonical form.
pub fn is_canonical(raw: &str) -> bool {
    AnswerVerdict::parse(raw)
        .canonical()
        .is_some_and(|c| c == raw.trim())
}

/// Strips `keyword` (ASCII, case-insensitive) followed by a dash separator.
fn strip_keyword<'s>(text: &'s str, keyword: &str) -> Option<&'s str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = text[keyword.len()..].trim_start();
    rest.strip_prefix(&['—', '–', '-'][..])
}
