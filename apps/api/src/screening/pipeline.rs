//! Screening pipeline: resume bytes + job description → scored evaluation report.
//!
//! Stages run strictly in order and each gates the next:
//! ingest → chunk → index → extract skills → answer each question → evaluate → aggregate.
//! Questions are answered one after another; a stage failure aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::{aggregate, EvaluationRecord, Evaluator, Metric, ScoreRow};
use crate::llm_client::{Embedder, LanguageModel};
use crate::retrieval::{load_document, DocumentLoader, Retriever, TextSplitter, VectorIndex};
use crate::screening::answer_chain::{build_query, is_canonical, AnswerChain, AnswerVerdict};
use crate::screening::skills::{build_probes, extract_skills};

/// Where and how a resume was indexed.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub pages: usize,
    pub chunks: usize,
    pub embedding_model: String,
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
    #[serde(flatten)]
    pub verdict: AnswerVerdict,
    /// The raw answer is exactly `Yes — <evidence>` or `No — not mentioned`.
    pub conforms: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub index: IndexSummary,
    /// The model's unparsed skill reply, shown so odd formatting is visible.
    pub extracted_skills_raw: String,
    pub skills: Vec<String>,
    pub rows: Vec<ScoreRow>,
    /// Mean `resume_match_score` across rows, 0–100.
    pub final_score: f64,
    pub answers: Vec<QuestionAnswer>,
    pub evaluator: String,
}

/// The collaborators one run needs, constructed once at startup and shared.
#[derive(Clone)]
pub struct ScreeningPipeline {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    evaluator: Arc<dyn Evaluator>,
    loader: Arc<dyn DocumentLoader>,
    splitter: TextSplitter,
    index_dir: PathBuf,
}

impl ScreeningPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        evaluator: Arc<dyn Evaluator>,
        loader: Arc<dyn DocumentLoader>,
        splitter: TextSplitter,
        index_dir: PathBuf,
    ) -> Self {
        Self {
            llm,
            embedder,
            evaluator,
            loader,
            splitter,
            index_dir,
        }
    }

    pub fn llm(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Ingests, chunks, embeds and persists a resume, replacing the previous index.
    pub async fn index_resume(&self, document: Bytes) -> Result<(VectorIndex, IndexSummary), AppError> {
        let pages = load_document(document, self.loader.clone()).await?;
        let chunks = self.splitter.split_pages(&pages);
        info!("Split {} pages into {} chunks", pages.len(), chunks.len());

        let index = VectorIndex::build(chunks, self.embedder.as_ref()).await?;
        let index_path = index.persist(&self.index_dir).await?;

        let summary = IndexSummary {
            pages: pages.len(),
            chunks: index.len(),
            embedding_model: index.embedding_model.clone(),
            index_path,
        };
        Ok((index, summary))
    }

    /// Runs the full pipeline for one resume and one job description.
    pub async fn run_evaluation(
        &self,
        document: Bytes,
        job_description: &str,
    ) -> Result<EvaluationReport, AppError> {
        let run_id = Uuid::new_v4();
        info!("Evaluation run {run_id} started");

        let (index, index_summary) = self.index_resume(document).await?;

        let extracted = extract_skills(job_description, self.llm.as_ref()).await?;
        let probes = build_probes(&extracted.skills);

        let chain = AnswerChain::new(
            Retriever::new(&index, self.embedder.as_ref()),
            self.llm.as_ref(),
        );

        let mut records = Vec::with_capacity(probes.len());
        let mut answers = Vec::with_capacity(probes.len());
        for (i, probe) in probes.iter().enumerate() {
            info!("Answering question {}/{}: {}", i + 1, probes.len(), probe.question);
            let query = build_query(job_description, &probe.question);
            let output = chain.run(&query).await?;

            let verdict = AnswerVerdict::parse(&output.answer);
            if verdict == AnswerVerdict::NonConforming {
                warn!("Answer for '{}' does not follow the Yes/No format", probe.skill);
            }
            answers.push(QuestionAnswer {
                question: probe.question.clone(),
                answer: output.answer.clone(),
                conforms: is_canonical(&output.answer),
                verdict,
            });
            records.push(EvaluationRecord {
                question: probe.question.clone(),
                contexts: output.context_texts(),
                answer: output.answer,
                reference: probe.reference.clone(),
            });
        }

        let scores = if records.is_empty() {
            warn!("Run {run_id}: no skills extracted, nothing to evaluate");
            Vec::new()
        } else {
            self.evaluator
                .evaluate(&records, &Metric::ALL)
                .await
                .map_err(|e| AppError::Llm(format!("Evaluation failed: {e}")))?
        };
        if scores.len() != records.len() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "evaluator returned {} rows for {} records",
                scores.len(),
                records.len()
            )));
        }

        let (rows, final_score) = aggregate(records, scores);
        info!("Run {run_id} finished: {} questions, score {final_score}", rows.len());

        Ok(EvaluationReport {
            run_id,
            generated_at: Utc::now(),
            index: index_summary,
            extracted_skills_raw: extracted.raw,
            skills: extracted.skills,
            rows,
            final_score,
            answers,
            evaluator: self.evaluator.backend().to_string(),
        })
    }
}
