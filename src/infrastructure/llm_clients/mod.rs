pub mod ollama;
pub mod openai;
pub mod stream;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use async_trait::async_trait;
use ollama::OllamaClient;
use openai::OpenAIClient;

/// Pass a successful response through; turn anything else into `LLMError`.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(AppError::LLMError(format!("API error ({}): {}", status, text)))
}

/// One completion call: instructions, the user-facing prompt and a token budget.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, config: &LLMConfig, request: &CompletionRequest) -> Result<String>;
    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>>;
}

pub struct RouterClient {
    ollama: OllamaClient,
    openai: OpenAIClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            ollama: OllamaClient::new(),
            openai: OpenAIClient::new(),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, request: &CompletionRequest) -> Result<String> {
        match config.provider {
            LLMProvider::Ollama => self.ollama.generate(config, request).await,
            LLMProvider::OpenAI => self.openai.generate(config, request).await,
        }
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        match config.provider {
            LLMProvider::Ollama => self.ollama.list_models(config).await,
            LLMProvider::OpenAI => self.openai.list_models(config).await,
        }
    }
}
