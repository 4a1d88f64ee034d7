//! In-process fakes for the model, embedder and loader collaborators, plus a
//! local Gemini stub server and a tiny PDF builder.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::llm_client::{Embedder, LanguageModel, LlmError};
use crate::retrieval::loader::{number_pages, DocumentLoader, IngestError, Page};

type Script = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// A language model that answers from a closure and records every prompt.
pub struct ScriptedModel {
    script: Box<Script>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::fallible(move |prompt| Ok(script(prompt)))
    }

    pub fn fallible(
        script: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.script)(prompt)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Deterministic bag-of-words embedder: each lowercase word is hashed
/// (FNV-1a) into one of `dimensions` buckets.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 512 }
    }
}

impl HashingEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.vector(text))
    }

    fn model_id(&self) -> &str {
        "hashing-bow"
    }
}

/// An embedder whose queries fail; document embedding still works so an
/// index can be built.
pub struct QueryFailingEmbedder {
    inner: HashingEmbedder,
}

impl QueryFailingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::default(),
        }
    }
}

#[async_trait]
impl Embedder for QueryFailingEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: "embedding backend unavailable".into(),
        })
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

enum LoaderBehaviour {
    Pages(Vec<String>),
    Fail(String),
    Panic,
}

/// A document loader with canned output that remembers the staged file.
pub struct StaticLoader {
    behaviour: LoaderBehaviour,
    seen: Mutex<Option<(PathBuf, Vec<u8>)>>,
}

impl StaticLoader {
    pub fn pages(pages: &[&str]) -> Self {
        Self::with(LoaderBehaviour::Pages(
            pages.iter().map(|p| p.to_string()).collect(),
        ))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(LoaderBehaviour::Fail(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with(LoaderBehaviour::Panic)
    }

    fn with(behaviour: LoaderBehaviour) -> Self {
        Self {
            behaviour,
            seen: Mutex::new(None),
        }
    }

    pub fn seen_path(&self) -> Option<PathBuf> {
        self.seen.lock().unwrap().as_ref().map(|(p, _)| p.clone())
    }

    pub fn seen_bytes(&self) -> Option<Vec<u8>> {
        self.seen.lock().unwrap().as_ref().map(|(_, b)| b.clone())
    }
}

impl DocumentLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let bytes = std::fs::read(path)?;
        *self.seen.lock().unwrap() = Some((path.to_path_buf(), bytes));

        match &self.behaviour {
            LoaderBehaviour::Pages(pages) => Ok(number_pages(pages)),
            LoaderBehaviour::Fail(message) => Err(IngestError::Parse(message.clone())),
            LoaderBehaviour::Panic => panic!("loader crashed"),
        }
    }
}

type StubScript = dyn Fn(usize, &Value) -> (u16, Value) + Send + Sync;

struct StubInner {
    script: Box<StubScript>,
    hits: AtomicUsize,
    requests: Mutex<Vec<(String, Option<String>, Value)>>,
}

/// A local HTTP server standing in for the Gemini REST API. The script maps
/// (0-based hit number, JSON body) to a status and JSON reply.
#[derive(Clone)]
pub struct GeminiStub {
    inner: Arc<StubInner>,
}

impl GeminiStub {
    pub fn new(script: impl Fn(usize, &Value) -> (u16, Value) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(StubInner {
                script: Box::new(script),
                hits: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Binds an ephemeral port and returns the base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .fallback(handle_stub)
            .with_state(self.inner.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn hits(&self) -> usize {
        self.inner.hits.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        let requests = self.inner.requests.lock().unwrap();
        requests.iter().map(|(path, _, _)| path.clone()).collect()
    }

    pub fn api_keys(&self) -> Vec<String> {
        let requests = self.inner.requests.lock().unwrap();
        requests
            .iter()
            .map(|(_, key, _)| key.clone().unwrap_or_default())
            .collect()
    }

    pub fn bodies(&self) -> Vec<Value> {
        let requests = self.inner.requests.lock().unwrap();
        requests.iter().map(|(_, _, body)| body.clone()).collect()
    }

    /// A `generateContent` reply carrying `text`.
    pub fn completion(text: &str) -> Value {
        json!({
            "candidates": [{"content": {"parts": [{"text": text}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1}
        })
    }

    /// A `batchEmbedContents` reply with one vector per request in `body`.
    pub fn embeddings(body: &Value, dimensions: usize) -> Value {
        let count = body["requests"].as_array().map_or(0, Vec::len);
        let embeddings: Vec<Value> = (0..count)
            .map(|i| json!({"values": vec![i as f32 + 1.0; dimensions]}))
            .collect();
        json!({ "embeddings": embeddings })
    }
}

async fn handle_stub(
    State(stub): State<Arc<StubInner>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let hit = stub.hits.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let (status, reply) = (stub.script)(hit, &body);
    stub.requests
        .lock()
        .unwrap()
        .push((uri.path().to_string(), api_key, body));

    let status = StatusCode::from_u16(status).unwrap();
    (status, Json(reply)).into_response()
}

/// Builds a small, valid PDF with one Helvetica text line per page.
pub fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
    for (i, text) in pages.iter().enumerate() {
        let content_id = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{object}\nendobj\n", i + 1));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.into_bytes()
}
