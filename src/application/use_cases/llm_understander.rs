//! LLM-backed understanding and SQL generation.
//!
//! Every failure to obtain a usable completion (transport error, timeout,
//! missing or malformed JSON) is reported as `QueryError::LlmUnavailable` so
//! a [`FallbackUnderstander`](super::understander::FallbackUnderstander) can
//! rerun the request on rules.

use crate::application::use_cases::confidence::clamp_confidence;
use crate::application::use_cases::entity_extractor::EntityExtractor;
use crate::application::use_cases::entity_validator::validate_entities;
use crate::application::use_cases::filter_builders::DbType;
use crate::application::use_cases::intent_catalog::{entity_description, intent_info, INTENT_CATALOG};
use crate::application::use_cases::language_detector::detect_language;
use crate::application::use_cases::pattern_tables::PatternTables;
use crate::application::use_cases::security_guard::verify_untrusted_sql;
use crate::application::use_cases::sql_template_generator::{ensure_limit, QueryLimits};
use crate::application::use_cases::understander::{QueryUnderstander, Understanding};
use crate::domain::error::QueryError;
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::domain::query::{
    EntityBag, EntityType, GeneratedQuery, Intent, Language, NluResult, ProcessingMethod,
    QueryParams,
};
use crate::domain::response::{PipelineStage, ProcessingStep};
use crate::domain::schema::describe_schema;
use crate::infrastructure::llm_clients::{CompletionRequest, LLMClient};
use crate::infrastructure::response::parse_json_block;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Confidence given to an intent the model named but we do not support.
const UNSUPPORTED_INTENT_CONFIDENCE: f64 = 0.1;

const NLU_SYSTEM_PROMPT: &str = "You are the natural-language understanding component of a \
university library system. Answer with a single JSON object and nothing else.";

const SQL_SYSTEM_PROMPT: &str = "You are a database expert writing read-only SQL for a \
university library system. Answer with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct IntentReply {
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EntityReply {
    #[serde(default)]
    entities: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SqlReply {
    #[serde(default)]
    sql_query: String,
}

/// Snapshot of the LLM configuration and reachability.
#[derive(Debug, Clone, Serialize)]
pub struct LlmStatus {
    pub provider: LLMProvider,
    pub model: String,
    pub endpoint: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub models: Vec<String>,
    pub nlu_enabled: bool,
    pub sql_enabled: bool,
    pub fallback_enabled: bool,
    pub supported_intents: Vec<Intent>,
    pub supported_entities: Vec<EntityType>,
}

pub struct LlmUnderstander {
    client: Arc<dyn LLMClient>,
    config: LLMConfig,
    db_type: DbType,
    limits: QueryLimits,
    normalizer: EntityExtractor,
}

impl LlmUnderstander {
    pub fn new(
        client: Arc<dyn LLMClient>,
        config: LLMConfig,
        db_type: DbType,
        limits: QueryLimits,
        tables: Arc<PatternTables>,
    ) -> Self {
        Self {
            client,
            config,
            db_type,
            limits,
            normalizer: EntityExtractor::new(tables),
        }
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    async fn complete(&self, user: String, system: &str, max_tokens: u32) -> Result<String, QueryError> {
        let request = CompletionRequest {
            system: system.to_string(),
            user,
            max_tokens,
        };
        let limit = Duration::from_secs(self.config.timeout_secs);

        match timeout(limit, self.client.generate(&self.config, &request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(QueryError::LlmUnavailable(e.to_string())),
            Err(_) => Err(QueryError::LlmUnavailable(format!(
                "no completion within {}s",
                self.config.timeout_secs
            ))),
        }
    }

    fn classification_prompt(text: &str) -> String {
        let intents = INTENT_CATALOG
            .iter()
            .map(|info| {
                format!(
                    "- {}: {} (e.g. {})",
                    info.intent,
                    info.description_en,
                    info.examples.join(" / ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Supported intents:\n{}\n\nUser input: \"{}\"\n\n\
             Reply with JSON: {{\"intent\": \"<one intent name above, or unknown>\", \
             \"confidence\": <0.0-1.0>, \"reasoning\": \"<short reason>\"}}\n\nJSON:",
            intents, text
        )
    }

    fn extraction_prompt(text: &str, intent: Intent, relevant: &[EntityType]) -> String {
        let entities = relevant
            .iter()
            .map(|t| format!("- {}: {}", t, entity_description(*t)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "User input: \"{}\"\nIntent: {}\n\nEntity types to extract:\n{}\n\n\
             Only extract values that literally appear in the input. Omit entities that are \
             not present.\nReply with JSON: {{\"entities\": {{\"<entity type>\": \"<value>\"}}, \
             \"confidence\": <0.0-1.0>}}\n\nJSON:",
            text, intent, entities
        )
    }

    fn generation_prompt(&self, intent: Intent, entities: &EntityBag, params: &QueryParams, limit: u32) -> String {
        let dialect = match self.db_type {
            DbType::Postgres => "PostgreSQL (use ILIKE for case-insensitive matching)",
            DbType::Sqlite => "SQLite (use LIKE for case-insensitive matching)",
        };
        let entities = serde_json::to_string(entities).unwrap_or_default();
        let params = serde_json::to_string(params).unwrap_or_default();

        format!(
            "Database schema:\n{}\nDialect: {}\n\nIntent: {}\nEntities: {}\nParameters: {}\n\n\
             Write one SELECT statement answering the intent. Join only the tables you need, \
             list columns explicitly, add ORDER BY, and LIMIT {} rows. Never modify data.\n\
             Reply with JSON: {{\"sql_query\": \"<statement>\", \"explanation\": \"<short>\"}}\n\nJSON:",
            describe_schema(),
            dialect,
            intent,
            entities,
            params,
            limit
        )
    }

    async fn classify(&self, text: &str) -> Result<(Intent, f64), QueryError> {
        let raw = self
            .complete(
                Self::classification_prompt(text),
                NLU_SYSTEM_PROMPT,
                self.config.max_tokens_nlu,
            )
            .await?;
        let reply: IntentReply = parse_json_block(&raw)?;
        let confidence = reply.confidence.unwrap_or(self.config.min_confidence);

        let intent = match Intent::from_str(&reply.intent) {
            Ok(intent) if intent == Intent::Unknown => (Intent::Unknown, confidence),
            Ok(_) if confidence < self.config.min_confidence => {
                debug!(
                    "LLM intent {} below minimum confidence ({:.2})",
                    reply.intent, confidence
                );
                (Intent::Unknown, confidence)
            }
            Ok(intent) => (intent, confidence),
            Err(_) => {
                warn!("LLM returned unsupported intent {:?}", reply.intent);
                (Intent::Unknown, UNSUPPORTED_INTENT_CONFIDENCE)
            }
        };
        Ok(intent)
    }

    async fn extract(
        &self,
        text: &str,
        intent: Intent,
        language: Language,
    ) -> Result<(EntityBag, Option<f64>), QueryError> {
        let Some(info) = intent_info(intent) else {
            return Ok((EntityBag::new(), None));
        };

        let raw = self
            .complete(
                Self::extraction_prompt(text, intent, info.entities),
                NLU_SYSTEM_PROMPT,
                self.config.max_tokens_nlu,
            )
            .await?;
        let reply: EntityReply = parse_json_block(&raw)?;

        let mut entities = EntityBag::new();
        for (key, value) in reply.entities {
            let Ok(entity_type) = EntityType::from_str(&key) else {
                continue;
            };
            if !info.entities.contains(&entity_type) {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => continue,
            };
            match self.normalizer.normalize(entity_type, &value, language) {
                Some(value) => entities.insert(entity_type, value),
                None => debug!("Dropped unusable {} value {:?} from model", entity_type, value),
            }
        }
        Ok((entities, reply.confidence))
    }

    /// Configured model and endpoint, plus whether the endpoint answers.
    pub async fn status(&self) -> LlmStatus {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let (available, models, error) =
            match timeout(limit, self.client.list_models(&self.config)).await {
                Ok(Ok(models)) => (true, models, None),
                Ok(Err(e)) => (false, Vec::new(), Some(e.to_string())),
                Err(_) => (false, Vec::new(), Some("status check timed out".to_string())),
            };

        LlmStatus {
            provider: self.config.provider,
            model: self.config.model.clone(),
            endpoint: self.config.base_url.clone(),
            available,
            error,
            models,
            nlu_enabled: self.config.enable_llm_nlu,
            sql_enabled: self.config.enable_llm_sql,
            fallback_enabled: self.config.enable_fallback,
            supported_intents: Intent::ALL.to_vec(),
            supported_entities: EntityType::ALL.to_vec(),
        }
    }
}

#[async_trait]
impl QueryUnderstander for LlmUnderstander {
    async fn understand(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<Understanding, QueryError> {
        if !self.config.enable_llm_nlu {
            return Err(QueryError::LlmUnavailable("LLM understanding is disabled".into()));
        }
        let mut steps = Vec::with_capacity(3);

        let started = Instant::now();
        let language = language.unwrap_or_else(|| detect_language(text));
        steps.push(ProcessingStep::since(PipelineStage::LanguageDetected, started));

        let started = Instant::now();
        let (intent, intent_confidence) = self.classify(text).await?;
        steps.push(ProcessingStep::since(PipelineStage::Classified, started));

        let started = Instant::now();
        let (entities, entity_confidence) = self.extract(text, intent, language).await?;
        steps.push(ProcessingStep::since(PipelineStage::EntitiesExtracted, started));

        let confidence = clamp_confidence(match entity_confidence {
            Some(c) => intent_confidence.min(c),
            None => intent_confidence,
        });
        info!("LLM understanding of {:?}: {} ({:.2})", text, intent, confidence);

        Ok(Understanding {
            nlu: NluResult {
                intent,
                entities,
                confidence,
                language,
                original_text: text.to_string(),
                processing_method: ProcessingMethod::LlmEnhanced,
            },
            steps,
        })
    }

    async fn generate(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, QueryError> {
        if intent == Intent::Unknown {
            return Err(QueryError::UnknownIntent);
        }
        if !self.config.enable_llm_sql {
            return Err(QueryError::LlmUnavailable("LLM query generation is disabled".into()));
        }

        let mut merged = entities.clone();
        for (entity_type, value) in params.values.iter() {
            merged.insert(entity_type, value);
        }
        let validation = validate_entities(intent, &merged);
        if !validation.valid {
            return Ok(GeneratedQuery::invalid(validation.missing));
        }

        let limit = match intent {
            Intent::QueryStatistics => self.limits.statistics_limit,
            _ => self.limits.default_limit,
        };
        let limit = params.limit.unwrap_or(limit).clamp(1, self.limits.max_limit.max(1));

        let raw = self
            .complete(
                self.generation_prompt(intent, &merged, params, limit),
                SQL_SYSTEM_PROMPT,
                self.config.max_tokens_sql,
            )
            .await?;
        let reply: SqlReply = parse_json_block(&raw)?;
        if reply.sql_query.trim().is_empty() {
            return Err(QueryError::LlmUnavailable("LLM returned no SQL".into()));
        }

        let sql = ensure_limit(&reply.sql_query, intent, limit);
        verify_untrusted_sql(&sql)?;
        debug!("LLM SQL for {}: {}", intent, sql);

        Ok(GeneratedQuery {
            query_text: sql,
            params: Vec::new(),
            is_valid: true,
            missing_entities: Vec::new(),
        })
    }

    fn method(&self) -> ProcessingMethod {
        ProcessingMethod::LlmEnhanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{AppError, Result as AppResult};
    use std::sync::Mutex;

    /// Replies with canned completions in order.
    struct ScriptedClient {
        replies: Mutex<Vec<AppResult<String>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<AppResult<String>>) -> Arc<Self> {
            let mut replies = replies;
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(&self, _config: &LLMConfig, _request: &CompletionRequest) -> AppResult<String> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AppError::LLMError("script exhausted".into())))
        }

        async fn list_models(&self, _config: &LLMConfig) -> AppResult<Vec<String>> {
            Ok(vec!["llama3.2".into()])
        }
    }

    fn understander(client: Arc<ScriptedClient>) -> LlmUnderstander {
        LlmUnderstander::new(
            client,
            LLMConfig::default(),
            DbType::Sqlite,
            QueryLimits::default(),
            Arc::new(PatternTables::builtin().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_understands_from_json_with_prose() {
        let client = ScriptedClient::new(vec![
            Ok("Sure. {\"intent\": \"query_book_by_title\", \"confidence\": 0.9, \"reasoning\": \"title\"}".into()),
            Ok("<think>ok</think>{\"entities\": {\"book_title\": \"《三体》\", \"student_id\": \"x\"}, \"confidence\": 0.8}".into()),
        ]);
        let result = understander(client).understand("查找《三体》", None).await.unwrap();
        let nlu = result.nlu;
        assert_eq!(nlu.intent, Intent::QueryBookByTitle);
        assert_eq!(nlu.entities.get(EntityType::BookTitle), Some("三体"));
        assert!(!nlu.entities.contains(EntityType::StudentId));
        assert!((nlu.confidence - 0.8).abs() < 1e-9);
        assert_eq!(nlu.processing_method, ProcessingMethod::LlmEnhanced);
        assert_eq!(result.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_model_entities_share_extractor_normalization() {
        let client = ScriptedClient::new(vec![
            Ok("{\"intent\": \"query_borrowing_records\", \"confidence\": 0.9}".into()),
            Ok("{\"entities\": {\"date\": \"2024年3月5日\", \"time_range\": \"last month\", \"status\": \"逾期\"}, \"confidence\": 0.9}".into()),
        ]);
        let nlu = understander(client).understand("上个月逾期的借阅记录", None).await.unwrap().nlu;
        assert_eq!(nlu.entities.get(EntityType::Date), Some("2024-03-05"));
        assert_eq!(nlu.entities.get(EntityType::TimeRange), Some("last_month"));
        assert_eq!(nlu.entities.get(EntityType::Status), Some("overdue"));

        let client = ScriptedClient::new(vec![
            Ok("{\"intent\": \"query_book_by_category\", \"confidence\": 0.9}".into()),
            Ok("{\"entities\": {\"category_name\": \"科幻\"}}".into()),
        ]);
        let nlu = understander(client).understand("科幻类的书", None).await.unwrap().nlu;
        assert_eq!(nlu.entities.get(EntityType::CategoryName), Some("Science Fiction"));

        let client = ScriptedClient::new(vec![
            Ok("{\"intent\": \"query_borrowing_records\", \"confidence\": 0.9}".into()),
            Ok("{\"entities\": {\"date\": \"sometime soon\"}}".into()),
        ]);
        let nlu = understander(client).understand("借阅记录", None).await.unwrap().nlu;
        assert!(!nlu.entities.contains(EntityType::Date));
    }

    #[tokio::test]
    async fn test_unsupported_intent_is_downgraded() {
        let client = ScriptedClient::new(vec![Ok(
            "{\"intent\": \"order_pizza\", \"confidence\": 0.99}".into()
        )]);
        let nlu = understander(client).understand("pizza please", None).await.unwrap().nlu;
        assert_eq!(nlu.intent, Intent::Unknown);
        assert!(nlu.entities.is_empty());
        assert!((nlu.confidence - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_low_confidence_intent_is_downgraded() {
        let client = ScriptedClient::new(vec![Ok(
            "{\"intent\": \"query_statistics\", \"confidence\": 0.2}".into()
        )]);
        let nlu = understander(client).understand("统计", None).await.unwrap().nlu;
        assert_eq!(nlu.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_transport_error_and_non_json_are_unavailable() {
        let client = ScriptedClient::new(vec![Err(AppError::LLMError("connection refused".into()))]);
        let result = understander(client).understand("查找《三体》", None).await;
        assert!(matches!(result, Err(QueryError::LlmUnavailable(_))));

        let client = ScriptedClient::new(vec![Ok("I am not sure what you mean.".into())]);
        let result = understander(client).understand("查找《三体》", None).await;
        assert!(matches!(result, Err(QueryError::LlmUnavailable(_))));
    }

    #[tokio::test]
    async fn test_generated_sql_gets_limit() {
        let client = ScriptedClient::new(vec![Ok(
            "{\"sql_query\": \"SELECT b.title FROM books b WHERE b.title LIKE '%三体%';\"}".into()
        )]);
        let entities = EntityBag::new().with(EntityType::BookTitle, "三体");
        let query = understander(client)
            .generate(Intent::QueryBookByTitle, &entities, &QueryParams::default())
            .await
            .unwrap();
        assert!(query.is_valid);
        assert_eq!(
            query.query_text,
            "SELECT b.title FROM books b WHERE b.title LIKE '%三体%' LIMIT 50"
        );
    }

    #[tokio::test]
    async fn test_destructive_sql_is_rejected() {
        let client = ScriptedClient::new(vec![Ok(
            "{\"sql_query\": \"SELECT 1; DROP TABLE books\"}".into()
        )]);
        let result = understander(client)
            .generate(Intent::QueryStatistics, &EntityBag::new(), &QueryParams::default())
            .await;
        assert!(matches!(result, Err(QueryError::SecurityViolation(_))));
    }

    #[tokio::test]
    async fn test_missing_entities_skip_the_llm() {
        let client = ScriptedClient::new(vec![]);
        let query = understander(client)
            .generate(Intent::QueryStudentBorrowing, &EntityBag::new(), &QueryParams::default())
            .await
            .unwrap();
        assert!(!query.is_valid);
        assert_eq!(query.missing_entities, vec![EntityType::StudentId]);
    }

    #[tokio::test]
    async fn test_status_reports_configuration() {
        let status = understander(ScriptedClient::new(vec![])).status().await;
        assert!(status.available);
        assert_eq!(status.model, "llama3.2");
        assert_eq!(status.supported_intents.len(), 8);
        assert_eq!(status.supported_entities.len(), 8);
    }
}
