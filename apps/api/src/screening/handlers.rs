use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::screening::analysis::{analyze_resume, ResumeAnalysis};
use crate::screening::pipeline::{EvaluationReport, IndexSummary};
use crate::state::AppState;

/// Fields pulled out of a multipart upload. Unknown fields are ignored.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<(String, Bytes)>,
    pub job_description: Option<String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
        {
            match field.name().unwrap_or("") {
                "file" => {
                    let filename = field.file_name().unwrap_or("resume.pdf").to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
                    form.file = Some((filename, data));
                }
                "job_description" => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read job_description: {e}"))
                    })?;
                    form.job_description = Some(text);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn require_file(&mut self) -> Result<(String, Bytes), AppError> {
        match self.file.take() {
            Some((_, data)) if data.is_empty() => {
                Err(AppError::Validation("Uploaded file is empty".into()))
            }
            Some(file) => Ok(file),
            None => Err(AppError::Validation("A resume file is required".into())),
        }
    }
}

fn require_job_description(text: Option<&str>) -> Result<&str, AppError> {
    match text.map(str::trim) {
        Some(jd) if !jd.is_empty() => Ok(jd),
        _ => Err(AppError::Validation("job_description cannot be empty".into())),
    }
}

/// POST /api/v1/evaluate
pub async fn handle_evaluate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EvaluationReport>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let job_description = require_job_description(form.job_description.as_deref())?.to_string();
    let (filename, data) = form.require_file()?;
    info!("Evaluating {filename} ({} bytes)", data.len());

    let report = state.pipeline.run_evaluation(data, &job_description).await?;
    Ok(Json(report))
}

#[derive(Serialize)]
pub struct IndexResumeResponse {
    pub filename: String,
    #[serde(flatten)]
    pub index: IndexSummary,
}

/// POST /api/v1/resume
pub async fn handle_index_resume(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IndexResumeResponse>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let (filename, data) = form.require_file()?;
    info!("Indexing {filename} ({} bytes)", data.len());

    let (_, index) = state.pipeline.index_resume(data).await?;
    Ok(Json(IndexResumeResponse { filename, index }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub job_description: Option<String>,
}

/// POST /api/v1/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ResumeAnalysis>, AppError> {
    let job_description = require_job_description(req.job_description.as_deref())?;
    let pipeline = &state.pipeline;
    let analysis = analyze_resume(
        job_description,
        pipeline.llm(),
        pipeline.embedder(),
        pipeline.index_dir(),
    )
    .await?;
    Ok(Json(analysis))
}
