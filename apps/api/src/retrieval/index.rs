//! In-memory similarity index over embedded chunks, persisted as one JSON file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::llm_client::{cosine_similarity, Embedder, LlmError};
use crate::retrieval::chunker::Chunk;

pub const INDEX_FILE: &str = "index.json";
/// Number of chunks handed to the answer chain per question.
pub const DEFAULT_TOP_K: usize = 6;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document produced no text chunks")]
    EmptyDocument,

    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error("embedder returned {received} vectors for {expected} chunks")]
    VectorCount { expected: usize, received: usize },

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("no index found at {0}")]
    NotFound(PathBuf),

    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned by a search, with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub embedding_model: String,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Embeds every chunk and builds the index. Zero chunks is an error, never
    /// an empty index.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(IndexError::VectorCount {
                expected: chunks.len(),
                received: embeddings.len(),
            });
        }

        let dimensions = embeddings[0].len();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                found: bad.len(),
            });
        }

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        info!(
            "Built index: {} chunks, {} dimensions ({})",
            entries.len(),
            dimensions,
            embedder.model_id()
        );

        Ok(Self {
            embedding_model: embedder.model_id().to_string(),
            dimensions,
            built_at: Utc::now(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` chunks by cosine similarity, highest first. Equal scores keep
    /// index order.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Writes the index to `{dir}/index.json`, replacing any previous index.
    /// The file is written to a temporary sibling and renamed into place.
    pub async fn persist(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        let payload = serde_json::to_vec(self)?;
        let dir = dir.to_path_buf();

        let path = tokio::task::spawn_blocking(move || -> Result<PathBuf, IndexError> {
            let target = dir.join(INDEX_FILE);
            write_atomic(&target, &payload)?;
            Ok(target)
        })
        .await
        .map_err(|e| IndexError::Aborted(e.to_string()))??;

        info!("Persisted index to {}", path.display());
        Ok(path)
    }

    /// Loads a previously persisted index from `dir`.
    pub async fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(INDEX_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path))
            }
            Err(e) => return Err(IndexError::Io(e)),
        };
        let index: VectorIndex = serde_json::from_slice(&bytes)?;
        if index.is_empty() {
            return Err(IndexError::EmptyDocument);
        }
        debug!("Loaded index from {} ({} chunks)", path.display(), index.len());
        Ok(index)
    }
}

/// Writes `payload` to a temporary file next to `target`, syncs it to disk
/// and renames it over `target`. Readers see the old file or the new one.
fn write_atomic(target: &Path, payload: &[u8]) -> Result<(), IndexError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(payload)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(target).map_err(|e| IndexError::Io(e.error))?;
    Ok(())
}

/// Embeds a query and searches the index for the top-K chunks.
pub struct Retriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a VectorIndex, embedder: &'a dyn Embedder) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, IndexError> {
        let query_embedding = self.embedder.embed_query(query).await?;
        if query_embedding.len() != self.index.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.index.dimensions,
                found: query_embedding.len(),
            });
        }
        let results = self.index.search(&query_embedding, self.top_k);
        debug!(
            "Retrieved {} chunks (best score {:.3})",
            results.len(),
            results.first().map(|r| r.score).unwrap_or(0.0)
        );
        Ok(results)
    }
}
