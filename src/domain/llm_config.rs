use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    /// Text-completion endpoint answering with newline-delimited JSON fragments.
    Ollama,
    /// OpenAI-compatible chat completions.
    OpenAI,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Token budget for classification and extraction prompts.
    pub max_tokens_nlu: u32,
    /// Token budget for query generation prompts.
    pub max_tokens_sql: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub stop_sequences: Vec<String>,
    pub enable_llm_nlu: bool,
    pub enable_llm_sql: bool,
    /// Re-run the pattern-based strategy when the LLM is unavailable.
    pub enable_fallback: bool,
    /// LLM intents below this confidence are downgraded to `unknown`.
    pub min_confidence: f64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            max_tokens_nlu: 300,
            max_tokens_sql: 800,
            temperature: 0.1,
            timeout_secs: 30,
            stop_sequences: vec!["```".to_string(), "---".to_string(), "===".to_string()],
            enable_llm_nlu: true,
            enable_llm_sql: true,
            enable_fallback: true,
            min_confidence: 0.3,
        }
    }
}
