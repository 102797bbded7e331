pub mod confidence;
pub mod entity_extractor;
pub mod entity_validator;
pub mod filter_builders;
pub mod intent_catalog;
pub mod intent_classifier;
pub mod language_detector;
pub mod llm_understander;
pub mod pattern_tables;
pub mod query_service;
pub mod responder;
pub mod result_formatter;
pub mod security_guard;
pub mod sql_template_generator;
pub mod suggestions;
pub mod understander;
