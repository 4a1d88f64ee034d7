//! Language-model judge: answer relevancy via reverse-generated questions,
//! answer similarity via embedding cosine against the reference.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::evaluation::prompts::RELEVANCY_PROMPT_TEMPLATE;
use crate::evaluation::{EvaluationRecord, Evaluator, Metric, MetricScores};
use crate::llm_client::prompts::{render_template, JSON_ONLY_SYSTEM};
use crate::llm_client::{complete_json, cosine_similarity, Embedder, LanguageModel, LlmError};

/// Questions generated per answer for the relevancy metric.
const DEFAULT_STRICTNESS: usize = 3;

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    noncommittal: bool,
}

pub struct LlmJudgeEvaluator {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    strictness: usize,
}

impl LlmJudgeEvaluator {
    pub fn new(llm: Arc<dyn LanguageModel>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            llm,
            embedder,
            strictness: DEFAULT_STRICTNESS,
        }
    }

    /// Mean cosine similarity between the original question and questions
    /// the judge derives from the answer; 0 when the answer is noncommittal.
    async fn answer_relevancy(&self, record: &EvaluationRecord) -> Result<f64, LlmError> {
        let count = self.strictness.to_string();
        let context = record.contexts.join("\n");
        let prompt = render_template(
            RELEVANCY_PROMPT_TEMPLATE,
            &[
                ("count", count.as_str()),
                ("context", context.as_str()),
                ("answer", record.answer.as_str()),
            ],
        );

        let generated: GeneratedQuestions =
            complete_json(self.llm.as_ref(), &prompt, Some(JSON_ONLY_SYSTEM)).await?;

        if generated.noncommittal {
            debug!("Answer judged noncommittal: {}", record.answer);
            return Ok(0.0);
        }
        let questions: Vec<&str> = generated
            .questions
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .collect();
        if questions.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        let original = self.embedder.embed_query(&record.question).await?;
        let derived = self.embedder.embed_documents(&questions).await?;
        if derived.is_empty() {
            return Err(LlmError::EmbeddingCount {
                sent: questions.len(),
                received: 0,
            });
        }

        let total: f64 = derived
            .iter()
            .map(|q| f64::from(cosine_similarity(&original, q)))
            .sum();
        Ok(clamp_unit(total / derived.len() as f64))
    }

    /// Cosine similarity between the answer and the reference embeddings.
    async fn answer_similarity(&self, record: &EvaluationRecord) -> Result<f64, LlmError> {
        let vectors = self
            .embedder
            .embed_documents(&[record.answer.as_str(), record.reference.as_str()])
            .await?;
        match vectors.as_slice() {
            [answer, reference] => Ok(clamp_unit(f64::from(cosine_similarity(answer, reference)))),
            other => Err(LlmError::EmbeddingCount {
                sent: 2,
                received: other.len(),
            }),
        }
    }

    async fn score(&self, record: &EvaluationRecord, metric: Metric) -> Result<f64, LlmError> {
        match metric {
            Metric::AnswerRelevancy => self.answer_relevancy(record).await,
            Metric::AnswerSimilarity => self.answer_similarity(record).await,
        }
    }
}

#[async_trait]
impl Evaluator for LlmJudgeEvaluator {
    async fn evaluate(
        &self,
        records: &[EvaluationRecord],
        metrics: &[Metric],
    ) -> Result<Vec<MetricScores>, LlmError> {
        let mut results = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            let mut scores = MetricScores::default();
            for metric in metrics {
                match self.score(record, *metric).await {
                    Ok(value) => scores.set(*metric, Some(value)),
                    Err(e) if e.is_invocation_failure() => return Err(e),
                    Err(e) => {
                        warn!(
                            "Metric {} unavailable for record {}: {}",
                            metric.as_str(),
                            i,
                            e
                        );
                        scores.set(*metric, None);
                    }
                }
            }
            results.push(scores);
        }

        info!(
            "Evaluated {} records with {} metrics",
            records.len(),
            metrics.len()
        );
        Ok(results)
    }

    fn backend(&self) -> &str {
        "llm-judge"
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, 1.0)
    }
}
