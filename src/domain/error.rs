use crate::domain::query::EntityType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("LLM error: {0}")]
    LLMError(String),
    #[error("Security error: {0}")]
    SecurityError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure taxonomy of the query pipeline.
///
/// Every variant is caught at the orchestrator boundary and turned into a
/// structured response; none of them escape to the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("no intent matched the input")]
    UnknownIntent,
    #[error("missing required entities: {0:?}")]
    IncompleteEntities(Vec<EntityType>),
    #[error("security violation: {0}")]
    SecurityViolation(String),
    #[error("query generation failed: {0}")]
    QueryGenerationFailure(String),
    #[error("query execution failed: {0}")]
    QueryExecutionFailure(String),
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
}

impl QueryError {
    /// Stable status tag reported to API consumers.
    pub fn status_tag(&self) -> &'static str {
        match self {
            QueryError::UnknownIntent => "unknown_intent",
            QueryError::IncompleteEntities(_) => "incomplete_entities",
            QueryError::SecurityViolation(_) => "security_violation",
            QueryError::QueryGenerationFailure(_) => "query_generation_failed",
            QueryError::QueryExecutionFailure(_) => "query_execution_failed",
            QueryError::LlmUnavailable(_) => "degraded",
        }
    }
}

impl From<AppError> for QueryError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::LLMError(msg) | AppError::ParseError(msg) => QueryError::LlmUnavailable(msg),
            AppError::SecurityError(msg) => QueryError::SecurityViolation(msg),
            AppError::DatabaseError(msg) => QueryError::QueryExecutionFailure(msg),
            other => QueryError::QueryGenerationFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_maps_into_pipeline_taxonomy() {
        assert!(matches!(
            QueryError::from(AppError::LLMError("timeout".into())),
            QueryError::LlmUnavailable(_)
        ));
        assert!(matches!(
            QueryError::from(AppError::DatabaseError("gone".into())),
            QueryError::QueryExecutionFailure(_)
        ));
        assert!(matches!(
            QueryError::from(AppError::SecurityError("drop".into())),
            QueryError::SecurityViolation(_)
        ));
        assert!(matches!(
            QueryError::from(AppError::Internal("x".into())),
            QueryError::QueryGenerationFailure(_)
        ));
    }

    #[test]
    fn test_status_tags() {
        assert_eq!(QueryError::UnknownIntent.status_tag(), "unknown_intent");
        assert_eq!(
            QueryError::IncompleteEntities(vec![EntityType::StudentId]).status_tag(),
            "incomplete_entities"
        );
        assert_eq!(QueryError::LlmUnavailable("x".into()).status_tag(), "degraded");
    }
}
