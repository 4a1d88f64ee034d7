//! Document ingestion — uploaded bytes to page text via a scoped temporary file.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("uploaded document is empty")]
    EmptyUpload,

    #[error("failed to stage temporary document: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("document could not be parsed: {0}")]
    Parse(String),

    #[error("document loader aborted: {0}")]
    Aborted(String),
}

/// Text of a single document page. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

/// Turns a document on disk into pages. The path is only valid for the
/// duration of the call.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError>;
}

/// PDF loader backed by `pdf-extract`, one text block per PDF page.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let texts = pdf_extract::extract_text_by_pages(path)
            .map_err(|e| IngestError::Parse(e.to_string()))?;
        Ok(number_pages(texts))
    }
}

/// Numbers page texts from 1. Blank pages are dropped but keep their place
/// in the numbering.
pub fn number_pages<I, S>(texts: I) -> Vec<Page>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    texts
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let text = text.as_ref().trim();
            (!text.is_empty()).then(|| Page {
                number: i + 1,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Writes the upload to a named temporary file, hands it to the loader and
/// removes the file again. Removal happens on success, on loader error and
/// when the loader panics.
pub async fn load_document(
    document: Bytes,
    loader: Arc<dyn DocumentLoader>,
) -> Result<Vec<Page>, IngestError> {
    if document.is_empty() {
        return Err(IngestError::EmptyUpload);
    }

    let size = document.len();
    let pages = tokio::task::spawn_blocking(move || -> Result<Vec<Page>, IngestError> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("resume_")
            .suffix(".pdf")
            .tempfile()?;
        temp_file.write_all(&document)?;
        temp_file.flush()?;
        debug!("Staged {} bytes at {:?}", size, temp_file.path());

        let result = loader.load(temp_file.path());
        temp_file.close()?;
        result
    })
    .await
    .map_err(|e| IngestError::Aborted(e.to_string()))??;

    info!("Loaded document: {} bytes, {} pages", size, pages.len());
    Ok(pages)
}
