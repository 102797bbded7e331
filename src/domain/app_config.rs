use crate::domain::llm_config::LLMConfig;
use serde::{Deserialize, Serialize};

/// Service configuration with all tunable parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`; the scheme selects the query dialect
    pub url: String,

    pub max_connections: u32,

    /// Per-statement timeout enforced by the executor
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Row cap applied when the caller gives none
    pub default_limit: u32,

    /// Row cap for popularity statistics
    pub statistics_limit: u32,

    /// Upper bound for caller-supplied limits
    pub max_limit: u32,

    pub max_batch_size: usize,

    /// Drop the query text from execution-failure responses
    pub redact_failed_queries: bool,

    /// Lifetime of stored conversation context
    pub context_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            query_timeout_secs: 30,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            statistics_limit: 10,
            max_limit: 200,
            max_batch_size: 10,
            redact_failed_queries: true,
            context_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AppConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Validate query limits
        if self.query.default_limit == 0 {
            errors.push("default_limit must be at least 1".to_string());
        }
        if self.query.statistics_limit == 0 {
            errors.push("statistics_limit must be at least 1".to_string());
        }
        if self.query.max_limit < self.query.default_limit {
            errors.push(format!(
                "max_limit ({}) must not be below default_limit ({})",
                self.query.max_limit, self.query.default_limit
            ));
        }
        if self.query.max_batch_size == 0 {
            errors.push("max_batch_size must be at least 1".to_string());
        }
        if self.query.max_batch_size > 50 {
            warnings.push("Batches over 50 queries are rejected by the HTTP layer".to_string());
        }

        // Validate LLM config
        if self.llm.model.trim().is_empty() {
            errors.push("LLM model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            errors.push(format!(
                "LLM temperature must be within [0, 2], got {}",
                self.llm.temperature
            ));
        }
        if !(0.0..=1.0).contains(&self.llm.min_confidence) {
            errors.push(format!(
                "min_confidence must be within [0, 1], got {}",
                self.llm.min_confidence
            ));
        }
        if self.llm.timeout_secs == 0 {
            errors.push("LLM timeout must be at least 1 second".to_string());
        }
        if url::Url::parse(&self.llm.base_url).is_err() {
            errors.push(format!("Invalid LLM base_url: {}", self.llm.base_url));
        }
        if self.llm.enable_llm_nlu && !self.llm.enable_fallback {
            warnings.push(
                "LLM fallback disabled; an unreachable model yields degraded responses".to_string(),
            );
        }

        // Validate database config
        if !(self.database.url.starts_with("postgres") || self.database.url.starts_with("sqlite")) {
            errors.push(format!(
                "Unsupported database url scheme: {}",
                self.database.url
            ));
        }
        if self.database.max_connections == 0 {
            errors.push("max_connections must be at least 1".to_string());
        }

        ConfigValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let validation = AppConfig::default().validate();
        assert!(validation.valid, "{:?}", validation.errors);
    }

    #[test]
    fn test_rejects_limit_inversion_and_bad_temperature() {
        let mut config = AppConfig::default();
        config.query.max_limit = 10;
        config.llm.temperature = 3.5;
        let validation = config.validate();
        assert!(!validation.valid);
        assert_eq!(validation.errors.len(), 2);
    }

    #[test]
    fn test_rejects_unknown_database_scheme() {
        let mut config = AppConfig::default();
        config.database.url = "mysql://localhost/lib".to_string();
        assert!(!config.validate().valid);
    }
}
