//! External API provider for OpenAI-compatible chat and embedding endpoints.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::GenerationService;
use crate::config::LlmConfig;
use crate::embeddings::EmbeddingModel;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Endpoint {endpoint} returned an empty {field} list")]
    EmptyResponse { endpoint: String, field: &'static str },
}

/// HTTP client for an OpenAI-compatible API, covering both chat completions
/// and asymmetric query/passage embeddings.
pub struct ExternalProvider {
    config: LlmConfig,
    api_key: String,
    dimension: usize,
    client: Client,
}

impl ExternalProvider {
    /// Build a provider reading the API key from the environment variable
    /// named in the config.
    pub fn new(config: LlmConfig, dimension: usize) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key, dimension)
    }

    pub fn with_api_key(config: LlmConfig, api_key: String, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            base_url = %config.base_url,
            chat_model = %config.chat_model,
            connect_timeout_secs = config.connect_timeout_secs,
            "Creating ExternalProvider"
        );

        Ok(Self {
            config,
            api_key,
            dimension,
            client,
        })
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn embeddings_endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Parse a response body as JSON, returning a clear error if the server
    /// returned HTML (e.g. a gateway error page) instead of valid JSON.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') || trimmed.starts_with("<!") {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}). Response: {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    async fn post_json(&self, endpoint: &str, request: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::error!(endpoint = %endpoint, "Request timed out");
                    anyhow!("Request to {} timed out", endpoint)
                } else if e.is_connect() {
                    tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
                    anyhow!("Failed to connect to {}: {}", endpoint, e)
                } else {
                    tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
                    anyhow!("Request to {} failed: {}", endpoint, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint = %endpoint, status = %status, body = %body, "API returned error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn embed_with_model(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let endpoint = self.embeddings_endpoint();
        let request = json!({
            "model": model,
            "input": text,
        });

        let response = self.post_json(&endpoint, &request).await?;
        let result: EmbeddingResponse = Self::parse_json_response(response, &endpoint).await?;

        let first = result.data.into_iter().next().ok_or(ProviderError::EmptyResponse {
            endpoint,
            field: "data",
        })?;
        Ok(first.embedding)
    }
}

#[async_trait]
impl GenerationService for ExternalProvider {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let endpoint = self.chat_endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.config.chat_model,
            max_tokens = self.config.max_tokens,
            user_prompt_len = user_prompt.len(),
            "Sending chat completion request"
        );

        let request = json!({
            "model": self.config.chat_model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false
        });

        let response = self.post_json(&endpoint, &request).await?;
        let result: ChatCompletionResponse = Self::parse_json_response(response, &endpoint).await?;

        let first = result.choices.into_iter().next().ok_or(ProviderError::EmptyResponse {
            endpoint,
            field: "choices",
        })?;
        tracing::debug!("Chat response received, {} chars", first.message.content.len());
        Ok(first.message.content)
    }
}

#[async_trait]
impl EmbeddingModel for ExternalProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_model(text, &self.config.query_embedding_model)
            .await
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_model(text, &self.config.document_embedding_model)
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn provider() -> ExternalProvider {
        let mut config = EngineConfig::default().llm;
        config.base_url = "https://api.example.com/v1/".to_string();
        ExternalProvider::with_api_key(config, "test-key".to_string(), 8).unwrap()
    }

    #[test]
    fn endpoints_strip_trailing_slash() {
        let p = provider();
        assert_eq!(p.chat_endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(p.embeddings_endpoint(), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn missing_api_key_is_a_typed_error() {
        let mut config = EngineConfig::default().llm;
        config.api_key_env = "PACTA_TEST_KEY_THAT_DOES_NOT_EXIST".to_string();
        let err = ExternalProvider::new(config, 8).unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert!(matches!(provider_err, ProviderError::MissingApiKey(_)));
    }

    #[test]
    fn chat_response_parses_minimal_payload() {
        let raw = r#"{"choices": [{"message": {"content": "hello", "role": "assistant"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}
