// Retrieval layer: document ingestion, chunking and the similarity index.
// Embeddings go through llm_client::Embedder — no direct provider calls here.

pub mod chunker;
pub mod index;
pub mod loader;

pub use chunker::TextSplitter;
pub use index::{IndexError, Retriever, ScoredChunk, VectorIndex};
pub use loader::{load_document, DocumentLoader, IngestError, PdfLoader};
