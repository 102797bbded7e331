//! Request orchestration: understand, validate, generate, execute, format.
//!
//! `ask` never fails. Every [`QueryError`] is turned into a [`QueryResponse`]
//! with a localized message and next-step suggestions.

use crate::application::use_cases::confidence::MIN_CONFIDENCE;
use crate::application::use_cases::entity_validator::validate_entities;
use crate::application::use_cases::language_detector::detect_language;
use crate::application::use_cases::responder::natural_response;
use crate::application::use_cases::result_formatter::format_results;
use crate::application::use_cases::suggestions::{
    clarifying_questions, follow_up_suggestions, generation_failure_suggestions,
    missing_entities_message, retry_suggestions, unknown_intent_suggestions,
};
use crate::application::use_cases::understander::{QueryUnderstander, Understanding};
use crate::domain::app_config::QueryConfig;
use crate::domain::error::{AppError, QueryError, Result};
use crate::domain::query::{EntityBag, GeneratedQuery, Intent, Language, NluResult, QueryParams};
use crate::domain::response::{
    BatchItem, PipelineStage, ProcessingStep, QueryResponse, QueryStatus,
};
use crate::infrastructure::context_store::{ContextStore, SessionKey};
use crate::infrastructure::db::QueryExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One question plus everything that steers how it is answered.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub text: String,
    pub language: Option<Language>,
    pub session: Option<SessionKey>,
    /// `None` uses the service default.
    pub use_llm: Option<bool>,
    pub params: QueryParams,
}

impl AskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

pub struct QueryService {
    rules: Arc<dyn QueryUnderstander>,
    llm: Option<Arc<dyn QueryUnderstander>>,
    executor: Arc<dyn QueryExecutor>,
    context: Option<Arc<dyn ContextStore>>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(
        rules: Arc<dyn QueryUnderstander>,
        executor: Arc<dyn QueryExecutor>,
        config: QueryConfig,
    ) -> Self {
        Self {
            rules,
            llm: None,
            executor,
            context: None,
            config,
        }
    }

    /// LLM strategy used by default and whenever a request asks for it.
    pub fn with_llm(mut self, understander: Arc<dyn QueryUnderstander>) -> Self {
        self.llm = Some(understander);
        self
    }

    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context = Some(store);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn understander(&self, use_llm: Option<bool>) -> &Arc<dyn QueryUnderstander> {
        match (&self.llm, use_llm) {
            (Some(llm), None | Some(true)) => llm,
            _ => &self.rules,
        }
    }

    /// Understanding only, without generation or execution.
    pub async fn parse(
        &self,
        text: &str,
        language: Option<Language>,
        use_llm: Option<bool>,
    ) -> std::result::Result<NluResult, QueryError> {
        let understanding = self.understander(use_llm).understand(text, language).await?;
        Ok(understanding.nlu)
    }

    /// Generation only. The query is not executed.
    pub async fn generate_query(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
        use_llm: Option<bool>,
    ) -> std::result::Result<GeneratedQuery, QueryError> {
        self.understander(use_llm)
            .generate(intent, entities, params)
            .await
    }

    pub async fn ask(&self, request: AskRequest) -> QueryResponse {
        let understander = self.understander(request.use_llm);

        let Understanding { nlu, steps } =
            match understander.understand(&request.text, request.language).await {
                Ok(understanding) => understanding,
                Err(err) => {
                    let nlu = NluResult {
                        intent: Intent::Unknown,
                        entities: EntityBag::new(),
                        confidence: MIN_CONFIDENCE,
                        language: request
                            .language
                            .unwrap_or_else(|| detect_language(&request.text)),
                        original_text: request.text.clone(),
                        processing_method: understander.method(),
                    };
                    return failure(skeleton(&nlu, Vec::new()), &err, &self.config);
                }
            };

        let mut response = skeleton(&nlu, steps);
        let language = nlu.language;

        if let (Some(store), Some(key)) = (&self.context, &request.session) {
            if let Some(previous) = store.get(key).await {
                response.entities.fill_missing_from(&previous);
                debug!("Merged session context: {:?}", response.entities);
            }
        }

        if nlu.intent == Intent::Unknown {
            return failure(response, &QueryError::UnknownIntent, &self.config);
        }

        let started = Instant::now();
        let mut effective = response.entities.clone();
        for (entity_type, value) in request.params.values.iter() {
            effective.insert(entity_type, value);
        }
        let validation = validate_entities(nlu.intent, &effective);
        response.push_step(PipelineStage::Validated, started);
        if !validation.valid {
            return failure(
                response,
                &QueryError::IncompleteEntities(validation.missing),
                &self.config,
            );
        }

        let started = Instant::now();
        let query = match understander
            .generate(nlu.intent, &response.entities, &request.params)
            .await
        {
            Ok(query) if query.is_valid => query,
            Ok(query) => {
                return failure(
                    response,
                    &QueryError::IncompleteEntities(query.missing_entities),
                    &self.config,
                )
            }
            Err(err) => return failure(response, &err, &self.config),
        };
        response.push_step(PipelineStage::Generated, started);
        response.query_text = Some(query.query_text.clone());
        response.query_params = query.params.clone();

        let started = Instant::now();
        let rows = match self.executor.execute(&query).await {
            Ok(rows) => rows,
            Err(err) => return failure(response, &QueryError::from(err), &self.config),
        };
        response.push_step(PipelineStage::Executed, started);

        let started = Instant::now();
        response.results = format_results(nlu.intent, &rows, language);
        response.result_count = response.results.len();
        response.natural_response =
            natural_response(nlu.intent, &response.results, &response.entities, language);
        response.suggestions = follow_up_suggestions(nlu.intent, response.result_count, language);
        response.push_step(PipelineStage::Formatted, started);

        if let (Some(store), Some(key)) = (&self.context, &request.session) {
            let ttl = Duration::from_secs(self.config.context_ttl_secs);
            store.put(key, response.entities.clone(), ttl).await;
        }

        info!(
            "Answered {:?} as {} with {} results ({:?})",
            request.text, nlu.intent, response.result_count, response.processing_method
        );
        response
    }

    /// Answer every query concurrently. One failing item never aborts the
    /// others; each item reports its own outcome.
    pub async fn ask_batch(
        self: &Arc<Self>,
        queries: Vec<String>,
        use_llm: Option<bool>,
    ) -> Result<Vec<BatchItem>> {
        if queries.is_empty() {
            return Err(AppError::ValidationError("Batch must not be empty".to_string()));
        }
        if queries.len() > self.config.max_batch_size {
            return Err(AppError::ValidationError(format!(
                "Batch of {} queries exceeds the limit of {}",
                queries.len(),
                self.config.max_batch_size
            )));
        }

        let mut items: Vec<BatchItem> = queries
            .iter()
            .enumerate()
            .map(|(index, query)| BatchItem {
                index,
                query: query.clone(),
                response: None,
                error: Some("query was not processed".to_string()),
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (index, query) in queries.into_iter().enumerate() {
            let service = Arc::clone(self);
            tasks.spawn(async move {
                let request = AskRequest {
                    use_llm,
                    ..AskRequest::new(query)
                };
                (index, service.ask(request).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, response)) => {
                    let item = &mut items[index];
                    item.response = Some(response);
                    item.error = None;
                }
                Err(e) => error!("Batch query task failed: {}", e),
            }
        }

        let succeeded = items.iter().filter(|item| item.is_success()).count();
        info!("Batch finished: {}/{} succeeded", succeeded, items.len());
        Ok(items)
    }
}

fn skeleton(nlu: &NluResult, steps: Vec<ProcessingStep>) -> QueryResponse {
    QueryResponse {
        status: QueryStatus::Success,
        intent: nlu.intent,
        entities: nlu.entities.clone(),
        confidence: nlu.confidence,
        language: nlu.language,
        original_text: nlu.original_text.clone(),
        query_text: None,
        query_params: Vec::new(),
        results: Vec::new(),
        natural_response: String::new(),
        suggestions: Vec::new(),
        result_count: 0,
        missing_entities: None,
        clarifying_questions: None,
        error_message: None,
        processing_method: nlu.processing_method,
        processing_steps: steps,
    }
}

/// Terminal response for `err`.
fn failure(mut response: QueryResponse, err: &QueryError, config: &QueryConfig) -> QueryResponse {
    let language = response.language;
    response.results.clear();
    response.result_count = 0;

    match err {
        QueryError::UnknownIntent => {
            info!("No intent recognized for {:?}", response.original_text);
            response.status = QueryStatus::UnknownIntent;
            response.natural_response = match language {
                Language::Zh => "抱歉，我无法理解您的问题。请尝试更具体的描述。",
                Language::En => "Sorry, I couldn't understand your question. Please be more specific.",
            }
            .to_string();
            response.suggestions = unknown_intent_suggestions(language);
        }
        QueryError::IncompleteEntities(missing) => {
            info!("Missing entities for {}: {:?}", response.intent, missing);
            response.status = QueryStatus::IncompleteEntities;
            response.natural_response = missing_entities_message(missing, language);
            response.clarifying_questions = Some(clarifying_questions(missing, language));
            response.missing_entities = Some(missing.clone());
        }
        QueryError::SecurityViolation(reason) => {
            error!("Rejected query for {:?}: {}", response.original_text, reason);
            response.status = QueryStatus::SecurityViolation;
            response.query_text = None;
            response.query_params.clear();
            response.natural_response = match language {
                Language::Zh => "查询被安全检查拒绝，未执行。",
                Language::En => "The query was rejected by the safety check and was not run.",
            }
            .to_string();
            response.suggestions = retry_suggestions(language);
            response.error_message = Some(err.to_string());
        }
        QueryError::QueryGenerationFailure(reason) => {
            error!("Query generation failed: {}", reason);
            response.status = QueryStatus::QueryGenerationFailed;
            response.natural_response = match language {
                Language::Zh => "生成查询时出错。",
                Language::En => "Something went wrong while building the query.",
            }
            .to_string();
            response.suggestions = generation_failure_suggestions(language);
            response.error_message = Some(err.to_string());
        }
        QueryError::QueryExecutionFailure(reason) => {
            error!("Query execution failed: {}", reason);
            response.status = QueryStatus::QueryExecutionFailed;
            if config.redact_failed_queries {
                response.query_text = None;
                response.query_params.clear();
            }
            response.natural_response = match language {
                Language::Zh => "执行查询时出错，请稍后重试。",
                Language::En => "The query could not be run. Please try again later.",
            }
            .to_string();
            response.suggestions = retry_suggestions(language);
            response.error_message = Some(err.to_string());
        }
        QueryError::LlmUnavailable(reason) => {
            warn!("LLM unavailable and fallback disabled: {}", reason);
            response.status = QueryStatus::Degraded;
            response.natural_response = match language {
                Language::Zh => "语言模型暂时不可用，请稍后重试。",
                Language::En => "The language model is unavailable. Please try again later.",
            }
            .to_string();
            response.suggestions = retry_suggestions(language);
            response.error_message = Some(err.to_string());
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::pattern_tables::PatternTables;
    use crate::application::use_cases::sql_template_generator::SqlTemplateGenerator;
    use crate::application::use_cases::understander::{FallbackUnderstander, PatternUnderstander};
    use crate::domain::query::{EntityType, ProcessingMethod, Row};
    use crate::infrastructure::context_store::InMemoryContextStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns canned rows and remembers what it was asked to run.
    struct FakeExecutor {
        rows: Vec<Row>,
        fail: bool,
        executed: Mutex<Vec<GeneratedQuery>>,
    }

    impl FakeExecutor {
        fn with_rows(rows: Vec<Row>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                fail: false,
                executed: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                rows: Vec::new(),
                fail: true,
                executed: Mutex::new(Vec::new()),
            })
        }

        fn executed(&self) -> Vec<GeneratedQuery> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn execute(&self, query: &GeneratedQuery) -> Result<Vec<Row>> {
            self.executed.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(AppError::DatabaseError("connection reset".into()));
            }
            Ok(self.rows.clone())
        }
    }

    struct Unavailable;

    #[async_trait]
    impl QueryUnderstander for Unavailable {
        async fn understand(
            &self,
            _text: &str,
            _language: Option<Language>,
        ) -> std::result::Result<Understanding, QueryError> {
            Err(QueryError::LlmUnavailable("connection refused".into()))
        }

        async fn generate(
            &self,
            _intent: Intent,
            _entities: &EntityBag,
            _params: &QueryParams,
        ) -> std::result::Result<GeneratedQuery, QueryError> {
            Err(QueryError::LlmUnavailable("connection refused".into()))
        }

        fn method(&self) -> ProcessingMethod {
            ProcessingMethod::LlmEnhanced
        }
    }

    fn row(value: serde_json::Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn rules() -> Arc<PatternUnderstander> {
        Arc::new(PatternUnderstander::new(
            Arc::new(PatternTables::builtin().unwrap()),
            SqlTemplateGenerator::sqlite(),
        ))
    }

    fn service(executor: Arc<FakeExecutor>) -> QueryService {
        QueryService::new(rules(), executor, QueryConfig::default())
    }

    fn copy_row(title: &str) -> Row {
        row(json!({
            "copy_id": 1, "book_id": 1, "title": title, "author_name": "Liu Cixin",
            "category_name": "Science Fiction", "status": "available", "condition": "good",
            "call_number": "I247.5/L1", "shelf_location": "A-01"
        }))
    }

    #[tokio::test]
    async fn test_title_lookup_end_to_end() {
        let executor = FakeExecutor::with_rows(vec![copy_row("三体")]);
        let response = service(executor.clone()).ask(AskRequest::new("查找《三体》")).await;

        assert_eq!(response.status, QueryStatus::Success);
        assert_eq!(response.intent, Intent::QueryBookByTitle);
        assert_eq!(response.entities.get(EntityType::BookTitle), Some("三体"));
        assert!(response.confidence >= 0.6);
        assert_eq!(response.result_count, 1);
        assert!(response.natural_response.contains("三体"));

        let executed = executor.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].query_text.contains("b.title LIKE ?"));
        assert!(!executed[0].query_text.contains("三体"));
        assert_eq!(executed[0].params[0], json!("%三体%"));

        let stages: Vec<PipelineStage> =
            response.processing_steps.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::LanguageDetected,
                PipelineStage::Classified,
                PipelineStage::EntitiesExtracted,
                PipelineStage::Validated,
                PipelineStage::Generated,
                PipelineStage::Executed,
                PipelineStage::Formatted,
            ]
        );
    }

    #[tokio::test]
    async fn test_statistics_have_no_required_entities() {
        let executor = FakeExecutor::with_rows(vec![]);
        let response = service(executor.clone()).ask(AskRequest::new("统计热门图书")).await;

        assert_eq!(response.status, QueryStatus::Success);
        assert_eq!(response.intent, Intent::QueryStatistics);
        let sql = &executor.executed()[0].query_text;
        assert!(sql.contains("ORDER BY borrow_count DESC"));
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[tokio::test]
    async fn test_missing_student_asks_for_clarification() {
        let executor = FakeExecutor::with_rows(vec![]);
        let response = service(executor.clone()).ask(AskRequest::new("学生的借阅情况")).await;

        assert_eq!(response.status, QueryStatus::IncompleteEntities);
        assert_eq!(response.intent, Intent::QueryStudentBorrowing);
        assert_eq!(response.missing_entities, Some(vec![EntityType::StudentId]));
        assert_eq!(
            response.clarifying_questions,
            Some(vec!["请提供学生学号或姓名".to_string()])
        );
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_caller_values_satisfy_validation() {
        let executor = FakeExecutor::with_rows(vec![]);
        let request = AskRequest {
            params: QueryParams {
                values: EntityBag::new().with(EntityType::StudentId, "A1234567B"),
                ..Default::default()
            },
            ..AskRequest::new("学生的借阅情况")
        };
        let response = service(executor.clone()).ask(request).await;
        assert_eq!(response.status, QueryStatus::Success);
        assert_eq!(executor.executed()[0].params[0], json!("A1234567B"));
    }

    #[tokio::test]
    async fn test_unknown_input_is_a_clarification() {
        let executor = FakeExecutor::with_rows(vec![]);
        let response = service(executor.clone()).ask(AskRequest::new("hello there")).await;

        assert_eq!(response.status, QueryStatus::UnknownIntent);
        assert_eq!(response.intent, Intent::Unknown);
        assert!(!response.suggestions.is_empty());
        assert!(response.query_text.is_none());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_injection_attempt_never_reaches_text() {
        let executor = FakeExecutor::with_rows(vec![]);
        let request = AskRequest {
            params: QueryParams {
                values: EntityBag::new().with(EntityType::BookTitle, "'; DROP TABLE books; --"),
                ..Default::default()
            },
            ..AskRequest::new("查找《三体》")
        };
        let response = service(executor.clone()).ask(request).await;

        let executed = executor.executed();
        assert_eq!(response.status, QueryStatus::Success);
        assert!(!executed[0].query_text.to_uppercase().contains("DROP"));
        assert_eq!(executed[0].params[0], json!("%; DROP TABLE books; --%"));
    }

    #[tokio::test]
    async fn test_execution_failure_redacts_query() {
        let response = service(FakeExecutor::failing())
            .ask(AskRequest::new("Books by Liu Cixin"))
            .await;
        assert_eq!(response.status, QueryStatus::QueryExecutionFailed);
        assert!(response.query_text.is_none());
        assert!(response.error_message.is_some());

        let config = QueryConfig {
            redact_failed_queries: false,
            ..QueryConfig::default()
        };
        let response = QueryService::new(rules(), FakeExecutor::failing(), config)
            .ask(AskRequest::new("Books by Liu Cixin"))
            .await;
        assert!(response.query_text.is_some());
    }

    #[tokio::test]
    async fn test_llm_outage_falls_back_to_rules() {
        let executor = FakeExecutor::with_rows(vec![]);
        let composite = Arc::new(FallbackUnderstander::new(Arc::new(Unavailable), rules(), true));
        let service = service(executor).with_llm(composite);

        let response = service.ask(AskRequest::new("Books by Liu Cixin")).await;
        assert_eq!(response.status, QueryStatus::Success);
        assert_eq!(response.processing_method, ProcessingMethod::LlmFallbackToRules);
        assert_eq!(response.entities.get(EntityType::AuthorName), Some("Liu Cixin"));

        let rules_only = service
            .ask(AskRequest {
                use_llm: Some(false),
                ..AskRequest::new("Books by Liu Cixin")
            })
            .await;
        assert_eq!(rules_only.processing_method, ProcessingMethod::RuleBased);
        assert_eq!(rules_only.entities, response.entities);
    }

    #[tokio::test]
    async fn test_llm_outage_without_fallback_is_degraded() {
        let composite = Arc::new(FallbackUnderstander::new(Arc::new(Unavailable), rules(), false));
        let response = service(FakeExecutor::with_rows(vec![]))
            .with_llm(composite)
            .ask(AskRequest::new("Books by Liu Cixin"))
            .await;
        assert_eq!(response.status, QueryStatus::Degraded);
        assert_eq!(response.language, Language::En);
        assert!(response.error_message.is_some());
    }

    #[tokio::test]
    async fn test_session_context_fills_missing_entities() {
        let store = Arc::new(InMemoryContextStore::new());
        let executor = FakeExecutor::with_rows(vec![]);
        let service = service(executor.clone()).with_context_store(store.clone());
        let session = Some(SessionKey::new("u1", "s1"));

        let first = service
            .ask(AskRequest {
                session: session.clone(),
                ..AskRequest::new("学号A1234567B的借阅记录")
            })
            .await;
        assert_eq!(first.status, QueryStatus::Success);

        let second = service
            .ask(AskRequest {
                session,
                ..AskRequest::new("学生的借阅情况")
            })
            .await;
        assert_eq!(second.status, QueryStatus::Success);
        assert_eq!(second.entities.get(EntityType::StudentId), Some("A1234567B"));
    }

    #[tokio::test]
    async fn test_batch_reports_each_item() {
        let service = Arc::new(service(FakeExecutor::with_rows(vec![copy_row("三体")])));
        let items = service
            .ask_batch(
                vec!["查找《三体》".into(), "hello there".into(), "学生的借阅情况".into()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].index, 0);
        assert!(items[0].is_success());
        assert_eq!(items[1].query, "hello there");
        assert_eq!(
            items[1].response.as_ref().map(|r| r.status),
            Some(QueryStatus::UnknownIntent)
        );
        assert_eq!(
            items[2].response.as_ref().map(|r| r.status),
            Some(QueryStatus::IncompleteEntities)
        );
        assert!(items.iter().all(|item| item.error.is_none()));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let service = Arc::new(service(FakeExecutor::with_rows(vec![])));
        let queries = vec!["统计热门图书".to_string(); 11];
        assert!(matches!(
            service.ask_batch(queries, None).await,
            Err(AppError::ValidationError(_))
        ));
    }
}
