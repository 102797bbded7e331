use super::stream::FragmentAccumulator;
use super::{ensure_success, CompletionRequest, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    num_predict: u32,
    temperature: f32,
    stop: &'a [String],
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a local text-completion server streaming NDJSON fragments.
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(config: &LLMConfig, path: &str) -> String {
        format!("{}/{}", config.base_url.trim_end_matches('/'), path)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, config: &LLMConfig, request: &CompletionRequest) -> Result<String> {
        let url = Self::endpoint(config, "api/generate");
        let body = GenerateRequest {
            model: &config.model,
            prompt: &request.user,
            system: Some(request.system.as_str()).filter(|s| !s.is_empty()),
            stream: true,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: config.temperature,
                stop: &config.stop_sequences,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;
        let mut response = ensure_success(response).await?;

        let mut acc = FragmentAccumulator::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::LLMError(format!("Stream interrupted: {}", e)))?
        {
            acc.push(&chunk)?;
            if acc.is_done() {
                break;
            }
        }

        let text = acc.finish()?;
        debug!("Completion from {} ({} chars)", config.model, text.len());
        Ok(text)
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let url = Self::endpoint(config, "api/tags");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        let tags: TagsResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Malformed model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
