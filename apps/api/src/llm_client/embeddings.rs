//! Embedding collaborator: text in, fixed-dimension vector out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GeminiTransport, LlmError};

/// Gemini accepts at most 100 requests per `batchEmbedContents` call.
const MAX_BATCH: usize = 100;

/// Produces vectors for indexing (`embed_documents`) and for searching
/// (`embed_query`). Both must come from the same model so scores compare.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LlmError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    fn model_id(&self) -> &str;
}

/// Cosine similarity of two vectors. Returns 0.0 when either has zero
/// magnitude or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Gemini `batchEmbedContents` client.
#[derive(Clone)]
pub struct GeminiEmbedder {
    transport: GeminiTransport,
    model: String,
    /// `models/{model}` as required inside each request body.
    qualified_model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self, LlmError> {
        let model = model.into();
        let qualified_model = if model.starts_with("models/") {
            model.clone()
        } else {
            format!("models/{model}")
        };
        let model = model.trim_start_matches("models/").to_string();
        Ok(Self {
            transport: GeminiTransport::new(api_key)?,
            model,
            qualified_model,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.transport.set_base_url(base_url);
        self
    }

    async fn embed_with(&self, texts: &[&str], task: TaskType) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = self.transport.model_url(&self.model, "batchEmbedContents");
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|&text| EmbedContentRequest {
                        model: &self.qualified_model,
                        content: EmbedContent {
                            parts: vec![EmbedPart { text }],
                        },
                        task_type: task.as_str(),
                    })
                    .collect(),
            };

            let response: BatchEmbedResponse = self.transport.post_json(&url, &request).await?;
            if response.embeddings.len() != batch.len() {
                return Err(LlmError::EmbeddingCount {
                    sent: batch.len(),
                    received: response.embeddings.len(),
                });
            }
            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        debug!(
            "Embedded {} texts with {} ({:?})",
            texts.len(),
            self.model,
            task
        );
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_with(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_with(&[text], TaskType::RetrievalQuery)
            .await?
            .pop()
            .ok_or(LlmError::EmbeddingCount {
                sent: 1,
                received: 0,
            })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
