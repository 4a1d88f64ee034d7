/// LLM Client — the single point of entry for all Gemini API calls in the service.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// Generation goes through `LanguageModel`, vectors through `Embedder`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod embeddings;
pub mod prompts;

pub use embeddings::{cosine_similarity, Embedder, GeminiEmbedder};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_OUTPUT_TOKENS: u32 = 2048;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Embedding count mismatch: sent {sent} texts, received {received} vectors")]
    EmbeddingCount { sent: usize, received: usize },
}

impl LlmError {
    /// True when the provider could not be reached or refused the call
    /// (network, auth, quota). False for bad or empty model output.
    pub fn is_invocation_failure(&self) -> bool {
        matches!(
            self,
            LlmError::Http(_) | LlmError::Api { .. } | LlmError::RateLimited { .. }
        )
    }
}

/// A text-completion collaborator. Implemented by `LlmClient` in production
/// and by scripted fakes in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends one prompt, optionally with a system instruction, and returns the raw text.
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError>;

    fn model_id(&self) -> &str;
}

/// Calls the model and deserializes the text response as JSON.
/// The prompt must instruct the model to return valid JSON.
pub async fn complete_json<T: DeserializeOwned>(
    llm: &dyn LanguageModel,
    prompt: &str,
    system: Option<&str>,
) -> Result<T, LlmError> {
    let text = llm.complete(prompt, system).await?;
    if text.trim().is_empty() {
        return Err(LlmError::EmptyContent);
    }

    // Strip markdown code fences if the model wraps JSON in them
    serde_json::from_str(strip_json_fences(&text)).map_err(LlmError::Parse)
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenates the text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Shared HTTP transport
// ────────────────────────────────────────────────────────────────────────────

/// Authenticated HTTP transport shared by the generation and embedding clients.
/// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
#[derive(Clone)]
pub(crate) struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
    retry_base: Duration,
}

impl GeminiTransport {
    pub(crate) fn new(api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            retry_base: RETRY_BASE_DELAY,
        })
    }

    pub(crate) fn set_base_url(&mut self, base_url: &str) {
        self.base_url = base_url.trim_end_matches('/').to_string();
    }

    pub(crate) fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    pub(crate) async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(self.retry_base, attempt);
                warn!(
                    "Gemini call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Gemini API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error_message(body),
                });
            }

            return Ok(response.json::<R>().await?);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

/// Exponential backoff before retry `attempt` (1-based): base, 2·base, ...
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base * (1 << attempt.saturating_sub(1))
}

fn api_error_message(body: String) -> String {
    serde_json::from_str::<GeminiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

// ────────────────────────────────────────────────────────────────────────────
// Generation client
// ────────────────────────────────────────────────────────────────────────────

/// Gemini `generateContent` client used for skill extraction, answering,
/// judging and analysis.
#[derive(Clone)]
pub struct LlmClient {
    transport: GeminiTransport,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            transport: GeminiTransport::new(api_key)?,
            model: model.into(),
        })
    }

    /// Points the client at another API root, e.g. a regional endpoint or proxy.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.transport.set_base_url(base_url);
        self
    }

    /// Makes a raw call to the Gemini API, returning the full response object.
    pub async fn call(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<GenerateContentResponse, LlmError> {
        let request = build_request(prompt, system);
        let url = self.transport.model_url(&self.model, "generateContent");
        let response: GenerateContentResponse = self.transport.post_json(&url, &request).await?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "LLM call succeeded: model={}, prompt_tokens={}, output_tokens={}",
                self.model, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        if let Some(reason) = response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            if reason != "STOP" {
                warn!("Gemini finished with reason {reason}");
            }
        }
        response.text().ok_or(LlmError::EmptyContent)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn build_request<'a>(prompt: &'a str, system: Option<&'a str>) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: prompt }],
        }],
        system_instruction: system
            .filter(|s| !s.trim().is_empty())
            .map(|s| Content {
                role: None,
                parts: vec![Part { text: s }],
            }),
        generation_config: GenerationConfig {
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{GeminiStub, ScriptedModel};

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_request_serializes_camel_case_with_system() {
        let value = serde_json::to_value(build_request("hello", Some("be terse"))).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], MAX_OUTPUT_TOKENS);
        assert!(value["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_request_omits_blank_system() {
        let value = serde_json::to_value(build_request("hello", Some("  "))).unwrap();
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_response_text_joins_parts_of_first_candidate() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Python, "}, {"text": "Docker"}]}, "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some("Python, Docker"));
        assert_eq!(response.usage_metadata.unwrap().prompt_token_count, 12);
    }

    #[test]
    fn test_response_without_candidates_has_no_text() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_api_error_message_prefers_provider_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body.to_string()), "API key not valid");
        assert_eq!(api_error_message("plain".to_string()), "plain");
    }

    #[test]
    fn test_model_url_embeds_model_and_method() {
        let mut transport = GeminiTransport::new("k".into()).unwrap();
        assert_eq!(
            transport.model_url("gemini-2.5-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        transport.set_base_url("http://127.0.0.1:9999/v1beta/");
        assert_eq!(
            transport.model_url("m", "batchEmbedContents"),
            "http://127.0.0.1:9999/v1beta/models/m:batchEmbedContents"
        );
    }

    #[test]
    fn test_retry_delay_doubles_from_one_second() {
        assert_eq!(retry_delay(RETRY_BASE_DELAY, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(RETRY_BASE_DELAY, 2), Duration::from_secs(2));
    }

    /// Client against a local stub, with millisecond backoff so retries stay fast.
    async fn stub_client(stub: &GeminiStub) -> LlmClient {
        let mut client = LlmClient::new("test-key".into(), "gemini-test")
            .unwrap()
            .with_base_url(&stub.serve().await);
        client.transport.retry_base = Duration::from_millis(1);
        client
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_retries() {
        let stub = GeminiStub::new(|hit, _| match hit {
            0 | 1 => (429, json!({"error": {"message": "quota"}})),
            _ => (200, GeminiStub::completion("Python, Docker")),
        });
        let client = stub_client(&stub).await;

        let text = client.complete("skills?", None).await.unwrap();
        assert_eq!(text, "Python, Docker");
        assert_eq!(stub.hits(), 3);
        assert_eq!(stub.paths()[0], "/models/gemini-test:generateContent");
        assert_eq!(stub.api_keys()[0], "test-key");
    }

    #[tokio::test]
    async fn test_server_error_exhausts_three_attempts() {
        let stub = GeminiStub::new(|_, _| (503, json!({"error": {"message": "overloaded"}})));
        let client = stub_client(&stub).await;

        let result = client.complete("skills?", None).await;
        assert!(matches!(result, Err(LlmError::Api { status: 503, .. })));
        assert_eq!(stub.hits(), MAX_RETRIES as usize);
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let stub = GeminiStub::new(|_, _| {
            (400, json!({"error": {"code": 400, "message": "API key not valid"}}))
        });
        let client = stub_client(&stub).await;

        match client.complete("skills?", None).await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(stub.hits(), 1);
    }

    #[derive(Debug, Deserialize)]
    struct Verdict {
        ok: bool,
    }

    #[tokio::test]
    async fn test_complete_json_strips_fences() {
        let llm = ScriptedModel::new(|_| "```json\n{\"ok\": true}\n```".to_string());
        let verdict: Verdict = complete_json(&llm, "prompt", None).await.unwrap();
        assert!(verdict.ok);
    }

    #[tokio::test]
    async fn test_complete_json_empty_is_error() {
        let llm = ScriptedModel::new(|_| "   ".to_string());
        let result = complete_json::<Verdict>(&llm, "prompt", None).await;
        assert!(matches!(result, Err(LlmError::EmptyContent)));
    }
}
