use crate::domain::query::{EntityBag, EntityType, Intent, Language, ProcessingMethod};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Intent-specific projection of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedRecord {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    UnknownIntent,
    IncompleteEntities,
    SecurityViolation,
    QueryGenerationFailed,
    QueryExecutionFailed,
    /// LLM strategy failed and fallback was disabled.
    Degraded,
}

/// One state of the request pipeline, recorded as it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LanguageDetected,
    Classified,
    EntitiesExtracted,
    Validated,
    Generated,
    Executed,
    Formatted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub stage: PipelineStage,
    pub duration_ms: u64,
}

impl ProcessingStep {
    /// Step for `stage`, timed from `started` until now.
    pub fn since(stage: PipelineStage, started: Instant) -> Self {
        Self {
            stage,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Structured, non-throwing answer for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    pub intent: Intent,
    pub entities: EntityBag,
    pub confidence: f64,
    pub language: Language,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<serde_json::Value>,
    pub results: Vec<FormattedRecord>,
    pub natural_response: String,
    pub suggestions: Vec<String>,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_entities: Option<Vec<EntityType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarifying_questions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processing_method: ProcessingMethod,
    pub processing_steps: Vec<ProcessingStep>,
}

impl QueryResponse {
    /// Record that `stage` was reached, timed from `started`.
    pub fn push_step(&mut self, stage: PipelineStage, started: Instant) {
        self.processing_steps.push(ProcessingStep::since(stage, started));
    }
}

/// Result of one member of a batch, tagged with the text it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<QueryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.status == QueryStatus::Success)
    }
}
