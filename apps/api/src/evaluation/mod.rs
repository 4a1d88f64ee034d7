//! Evaluation — pluggable, trait-based scoring of RAG answers.
//!
//! Default: `LlmJudgeEvaluator` (language-model judge + embedding model).
//! `AppState` holds an `Arc<dyn Evaluator>` inside the screening pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm_client::LlmError;

pub mod aggregate;
pub mod judge;
pub mod prompts;

pub use aggregate::{aggregate, ScoreRow};
pub use judge::LlmJudgeEvaluator;

/// One (question, answer, contexts, reference) tuple handed to the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// How well the answer addresses its question.
    AnswerRelevancy,
    /// How close the answer is to the reference string.
    AnswerSimilarity,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::AnswerRelevancy, Metric::AnswerSimilarity];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::AnswerRelevancy => "answer_relevancy",
            Metric::AnswerSimilarity => "answer_similarity",
        }
    }
}

/// Per-record metric values. `None` means the metric was not requested or
/// could not be computed for this record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub answer_relevancy: Option<f64>,
    pub answer_similarity: Option<f64>,
}

impl MetricScores {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::AnswerRelevancy => self.answer_relevancy,
            Metric::AnswerSimilarity => self.answer_similarity,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::AnswerRelevancy => self.answer_relevancy = value,
            Metric::AnswerSimilarity => self.answer_similarity = value,
        }
    }

    /// Values that are present and finite.
    pub fn valid_values(&self) -> Vec<f64> {
        Metric::ALL
            .iter()
            .filter_map(|m| self.get(*m))
            .filter(|v| v.is_finite())
            .collect()
    }
}

/// The evaluator trait. Implement this to swap scoring backends without
/// touching the pipeline or handlers.
///
/// Returns exactly one `MetricScores` per record, in input order. A failure
/// to compute a metric for one record yields `None` for that value; only
/// model invocation failures (network, auth, rate limit) fail the batch.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        records: &[EvaluationRecord],
        metrics: &[Metric],
    ) -> Result<Vec<MetricScores>, LlmError>;

    /// Backend label, reported for transparency.
    fn backend(&self) -> &str;
}
