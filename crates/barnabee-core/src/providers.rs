//! Concrete upstream clients for the two model services the cascade and
//! resolver depend on abstractly (spec.md §6 "Upstream (consumed)"). Grounded
//! on `pagi-core::openrouter_service::OpenRouterBridge`: an OpenAI-compatible
//! `/chat/completions` and `/embeddings` client over a single `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use barnabee_nlu::cascade::LocalClassifier;
use barnabee_nlu::providers::{EmbeddingProvider, LlmProvider};
use barnabee_nlu::{NluError, NluResult};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: Value,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Chat-completion client constrained to a JSON schema via OpenRouter's
/// `response_format: json_schema` passthrough. Used by S4 and the Entity
/// Resolver's LLM-assisted phase.
pub struct HttpLlmProvider {
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_base: api_base.into(), api_key: api_key.into(), model: model.into(), client }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete_json(&self, system: &str, user: &str, schema: &Value) -> NluResult<Value> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "system", content: system }, ChatMessage { role: "user", content: user }],
            temperature: 0.1,
            max_tokens: 512,
            response_format: serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": schema },
            }),
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NluError::LlmProvider(e.to_string()))?
            .error_for_status()
            .map_err(|e| NluError::LlmProvider(e.to_string()))?;

        let parsed: ChatResponse = resp.json().await.map_err(|e| NluError::LlmProvider(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NluError::LlmProvider("empty choices array".to_string()))?
            .message
            .content;

        serde_json::from_str(&content).map_err(|e| NluError::LlmProvider(format!("non-JSON completion: {e}")))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    api_base: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_base: api_base.into(), api_key: api_key.into(), model: model.into(), dimension, client }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> NluResult<Vec<f32>> {
        let body = EmbeddingRequest { model: &self.model, input: text };
        let resp = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NluError::EmbeddingProvider(e.to_string()))?
            .error_for_status()
            .map_err(|e| NluError::EmbeddingProvider(e.to_string()))?;

        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| NluError::EmbeddingProvider(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| NluError::EmbeddingProvider("empty data array".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// S3 never clears its threshold: no fine-tuned local model ships with the
/// core (one is an external training artifact, out of scope per spec.md §1).
/// Every utterance falls through to S4, same as the cascade's built-in
/// behavior when a stage is under-confident.
pub struct PassthroughLocalClassifier;

impl LocalClassifier for PassthroughLocalClassifier {
    fn classify(&self, _normalized_text: &str) -> Vec<(String, f32)> {
        Vec::new()
    }
}
