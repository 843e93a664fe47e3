use crate::error::ModelError;
use crate::traits::{Embedder, LanguageModel};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

const BACKEND: &str = "gemini";
const MAX_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post(&self, model: &str, method: &str, body: &Value) -> Result<Value, ModelError> {
        let response = self
            .client
            .post(format!("{}/models/{}:{}", self.endpoint, model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiChatModel {
    client: GeminiClient,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
}

impl GeminiChatModel {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.3,
            max_output_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

#[async_trait]
impl LanguageModel for GeminiChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let mut generation_config = json!({ "temperature": self.temperature });
        if let Some(limit) = self.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(limit);
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "gemini generateContent");
        let payload = self.client.post(&self.model, "generateContent", &body).await?;
        parse_generation(serde_json::from_value(payload)?)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let requests = batch
                .iter()
                .map(|text| {
                    json!({
                        "model": format!("models/{}", self.model),
                        "content": { "parts": [{ "text": text }] },
                    })
                })
                .collect::<Vec<_>>();

            debug!(model = %self.model, batch = batch.len(), "gemini batchEmbedContents");
            let payload = self
                .client
                .post(&self.model, "batchEmbedContents", &json!({ "requests": requests }))
                .await?;
            vectors.extend(parse_embeddings(serde_json::from_value(payload)?, batch.len())?);
        }

        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

fn parse_generation(response: GenerateResponse) -> Result<String, ModelError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

fn parse_embeddings(
    response: BatchEmbedResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ModelError> {
    if response.embeddings.len() != expected {
        return Err(ModelError::CountMismatch {
            expected,
            returned: response.embeddings.len(),
        });
    }
    if response.embeddings.iter().any(|embedding| embedding.values.is_empty()) {
        return Err(ModelError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "embedding without values".to_string(),
        });
    }
    Ok(response
        .embeddings
        .into_iter()
        .map(|embedding| embedding.values)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_joins_text_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Paris" }, { "text": " is the capital." }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();

        assert_eq!(parse_generation(response).unwrap(), "Paris is the capital.");
    }

    #[test]
    fn blocked_generation_is_empty_response() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        assert!(matches!(
            parse_generation(response),
            Err(ModelError::EmptyResponse)
        ));
    }

    #[test]
    fn embeddings_keep_request_order() {
        let response: BatchEmbedResponse = serde_json::from_value(json!({
            "embeddings": [{ "values": [0.1, 0.2] }, { "values": [0.3, 0.4] }]
        }))
        .unwrap();

        let vectors = parse_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn embedding_count_mismatch_is_rejected() {
        let response: BatchEmbedResponse = serde_json::from_value(json!({
            "embeddings": [{ "values": [0.1] }]
        }))
        .unwrap();

        assert!(matches!(
            parse_embeddings(response, 3),
            Err(ModelError::CountMismatch {
                expected: 3,
                returned: 1
            })
        ));
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let client = GeminiClient::new("http://localhost:9/v1beta/", "key", Duration::from_secs(1))
            .expect("client builds");
        assert_eq!(client.endpoint, "http://localhost:9/v1beta");
    }
}
