//! Whole-resume analysis against a job description, using the persisted index.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::prompts::render_template;
use crate::llm_client::{complete_json, Embedder, LanguageModel};
use crate::retrieval::{Retriever, VectorIndex};
use crate::screening::prompts::{ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM};

pub const ANALYSIS_TOP_K: usize = 5;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    #[serde(default)]
    pub match_score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weaknesses: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub insights: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Retrieves the chunks closest to the job description from the last
/// indexed resume and asks the model for a structured comparison.
pub async fn analyze_resume(
    job_description: &str,
    llm: &dyn LanguageModel,
    embedder: &dyn Embedder,
    index_dir: &Path,
) -> Result<ResumeAnalysis, AppError> {
    let index = VectorIndex::load(index_dir).await?;
    if index.embedding_model != embedder.model_id() {
        warn!(
            "Index was built with {} but queries use {}",
            index.embedding_model,
            embedder.model_id()
        );
    }

    let contexts = Retriever::new(&index, embedder)
        .with_top_k(ANALYSIS_TOP_K)
        .retrieve(job_description)
        .await?;
    let resume_context = contexts
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let prompt = render_template(
        ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("job_description", job_description),
            ("resume_context", resume_context.as_str()),
        ],
    );

    let mut analysis: ResumeAnalysis = complete_json(llm, &prompt, Some(ANALYSIS_SYSTEM))
        .await
        .map_err(|e| AppError::Llm(format!("Resume analysis failed: {e}")))?;
    analysis.match_score = analysis.match_score.map(|s| s.clamp(0.0, 100.0));

    info!(
        "Analyzed resume against job description ({} contexts, score {:?})",
        contexts.len(),
        analysis.match_score
    );
    Ok(analysis)
}
