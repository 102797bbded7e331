//! Query understanding strategies.
//!
//! A [`QueryUnderstander`] turns free text into an [`NluResult`] and an
//! intent plus entities into a [`GeneratedQuery`]. The pattern-based
//! strategy is pure and always available; [`FallbackUnderstander`] wraps a
//! fallible primary strategy and reruns the pattern strategy when the
//! primary reports `LlmUnavailable`.

use crate::application::use_cases::confidence::aggregate_confidence;
use crate::application::use_cases::entity_extractor::EntityExtractor;
use crate::application::use_cases::intent_classifier::IntentClassifier;
use crate::application::use_cases::language_detector::detect_language;
use crate::application::use_cases::pattern_tables::PatternTables;
use crate::application::use_cases::sql_template_generator::SqlTemplateGenerator;
use crate::domain::error::QueryError;
use crate::domain::query::{
    EntityBag, GeneratedQuery, Intent, Language, NluResult, ProcessingMethod, QueryParams,
};
use crate::domain::response::{PipelineStage, ProcessingStep};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// An [`NluResult`] plus the stages that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Understanding {
    pub nlu: NluResult,
    pub steps: Vec<ProcessingStep>,
}

#[async_trait]
pub trait QueryUnderstander: Send + Sync {
    /// Detect language (unless given), classify and extract.
    async fn understand(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<Understanding, QueryError>;

    /// Build a bounded query. Missing required entities give an invalid query.
    async fn generate(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, QueryError>;

    fn method(&self) -> ProcessingMethod;
}

/// Rule-based strategy over the compiled pattern tables and SQL templates.
pub struct PatternUnderstander {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    generator: SqlTemplateGenerator,
}

impl PatternUnderstander {
    pub fn new(tables: Arc<PatternTables>, generator: SqlTemplateGenerator) -> Self {
        Self {
            classifier: IntentClassifier::new(tables.clone()),
            extractor: EntityExtractor::new(tables),
            generator,
        }
    }

    pub fn generator(&self) -> &SqlTemplateGenerator {
        &self.generator
    }

    /// Synchronous core of [`QueryUnderstander::understand`].
    pub fn analyze(&self, text: &str, language: Option<Language>) -> Understanding {
        let mut steps = Vec::with_capacity(3);

        let started = Instant::now();
        let language = language.unwrap_or_else(|| detect_language(text));
        steps.push(ProcessingStep::since(PipelineStage::LanguageDetected, started));

        let started = Instant::now();
        let classification = self.classifier.classify(text, language);
        steps.push(ProcessingStep::since(PipelineStage::Classified, started));

        let started = Instant::now();
        let entities = self.extractor.extract(text, language);
        steps.push(ProcessingStep::since(PipelineStage::EntitiesExtracted, started));

        let confidence = aggregate_confidence(classification.intent, entities.len(), text);
        debug!(
            "Rule-based understanding of {:?}: {} {:?} ({:.2})",
            text, classification.intent, entities, confidence
        );

        Understanding {
            nlu: NluResult {
                intent: classification.intent,
                entities,
                confidence,
                language,
                original_text: text.to_string(),
                processing_method: ProcessingMethod::RuleBased,
            },
            steps,
        }
    }
}

#[async_trait]
impl QueryUnderstander for PatternUnderstander {
    async fn understand(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<Understanding, QueryError> {
        Ok(self.analyze(text, language))
    }

    async fn generate(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, QueryError> {
        self.generator.generate(intent, entities, params)
    }

    fn method(&self) -> ProcessingMethod {
        ProcessingMethod::RuleBased
    }
}

/// Runs `primary`, and on `LlmUnavailable` reruns the request on `fallback`.
///
/// Understanding results produced by the fallback are tagged
/// `LlmFallbackToRules`. SQL rejected by the security checks also falls back
/// to `fallback`'s generator. With fallback disabled, errors pass through.
pub struct FallbackUnderstander {
    primary: Arc<dyn QueryUnderstander>,
    fallback: Arc<dyn QueryUnderstander>,
    enabled: bool,
}

impl FallbackUnderstander {
    pub fn new(
        primary: Arc<dyn QueryUnderstander>,
        fallback: Arc<dyn QueryUnderstander>,
        enabled: bool,
    ) -> Self {
        Self {
            primary,
            fallback,
            enabled,
        }
    }
}

#[async_trait]
impl QueryUnderstander for FallbackUnderstander {
    async fn understand(
        &self,
        text: &str,
        language: Option<Language>,
    ) -> Result<Understanding, QueryError> {
        match self.primary.understand(text, language).await {
            Err(QueryError::LlmUnavailable(reason)) if self.enabled => {
                warn!("LLM understanding unavailable ({}), using rules", reason);
                let mut understanding = self.fallback.understand(text, language).await?;
                understanding.nlu.processing_method = ProcessingMethod::LlmFallbackToRules;
                Ok(understanding)
            }
            other => other,
        }
    }

    async fn generate(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, QueryError> {
        match self.primary.generate(intent, entities, params).await {
            Err(err @ (QueryError::LlmUnavailable(_) | QueryError::SecurityViolation(_)))
                if self.enabled =>
            {
                warn!("LLM query generation failed ({}), using templates", err);
                self.fallback.generate(intent, entities, params).await
            }
            other => other,
        }
    }

    fn method(&self) -> ProcessingMethod {
        self.primary.method()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::EntityType;
    use chrono::NaiveDate;

    fn rules() -> Arc<PatternUnderstander> {
        Arc::new(PatternUnderstander::new(
            Arc::new(PatternTables::builtin().unwrap()),
            SqlTemplateGenerator::sqlite(),
        ))
    }

    struct Unavailable;

    #[async_trait]
    impl QueryUnderstander for Unavailable {
        async fn understand(
            &self,
            _text: &str,
            _language: Option<Language>,
        ) -> Result<Understanding, QueryError> {
            Err(QueryError::LlmUnavailable("connection refused".into()))
        }

        async fn generate(
            &self,
            _intent: Intent,
            _entities: &EntityBag,
            _params: &QueryParams,
        ) -> Result<GeneratedQuery, QueryError> {
            Err(QueryError::LlmUnavailable("timeout".into()))
        }

        fn method(&self) -> ProcessingMethod {
            ProcessingMethod::LlmEnhanced
        }
    }

    #[tokio::test]
    async fn test_rules_title_lookup() {
        let understanding = rules().understand("查找《三体》", None).await.unwrap();
        let nlu = understanding.nlu;
        assert_eq!(nlu.intent, Intent::QueryBookByTitle);
        assert_eq!(nlu.language, Language::Zh);
        assert_eq!(nlu.entities.get(EntityType::BookTitle), Some("三体"));
        assert!(nlu.confidence >= 0.6);
        assert_eq!(nlu.processing_method, ProcessingMethod::RuleBased);
        assert_eq!(understanding.steps.len(), 3);
        assert_eq!(understanding.steps[0].stage, PipelineStage::LanguageDetected);
    }

    #[tokio::test]
    async fn test_explicit_language_is_respected() {
        let understanding = rules()
            .understand("Books by Liu Cixin", Some(Language::En))
            .await
            .unwrap();
        assert_eq!(understanding.nlu.intent, Intent::QueryBookByAuthor);
        assert_eq!(
            understanding.nlu.entities.get(EntityType::AuthorName),
            Some("Liu Cixin")
        );
    }

    #[tokio::test]
    async fn test_fallback_matches_rules_except_method() {
        let rules = rules();
        let composite = FallbackUnderstander::new(Arc::new(Unavailable), rules.clone(), true);

        for text in ["查找《三体》", "Books by Liu Cixin", "统计热门图书", "学生的借阅情况", "hello"] {
            let expected = rules.understand(text, None).await.unwrap().nlu;
            let mut actual = composite.understand(text, None).await.unwrap().nlu;
            assert_eq!(actual.processing_method, ProcessingMethod::LlmFallbackToRules);
            actual.processing_method = ProcessingMethod::RuleBased;
            assert_eq!(actual, expected, "{}", text);
        }
    }

    #[tokio::test]
    async fn test_generation_falls_back_to_templates() {
        let rules = rules();
        let composite = FallbackUnderstander::new(Arc::new(Unavailable), rules.clone(), true);
        let entities = EntityBag::new().with(EntityType::BookTitle, "三体");
        let params = QueryParams {
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..Default::default()
        };

        let expected = rules
            .generate(Intent::QueryBookByTitle, &entities, &params)
            .await
            .unwrap();
        let actual = composite
            .generate(Intent::QueryBookByTitle, &entities, &params)
            .await
            .unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_disabled_fallback_surfaces_unavailable() {
        let composite = FallbackUnderstander::new(Arc::new(Unavailable), rules(), false);
        let result = composite.understand("查找《三体》", None).await;
        assert!(matches!(result, Err(QueryError::LlmUnavailable(_))));
        assert_eq!(composite.method(), ProcessingMethod::LlmEnhanced);
    }
}
