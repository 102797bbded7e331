use crate::application::use_cases::pattern_tables::{KeywordRule, PatternTables};
use crate::domain::query::{sanitize_entity_value, EntityBag, EntityType, Language, TimeRange};
use chrono::NaiveDate;
use regex::Regex;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Leading request verbs that greedy Chinese captures tend to swallow.
const ZH_REQUEST_PREFIXES: &[&str] = &[
    "我想找", "有没有", "查找", "查询", "搜索", "查看", "看看", "寻找", "找", "查",
];

const ZH_CATEGORY_SUFFIXES: &[&str] = &["类别的", "类别", "类的", "类", "的"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y年%m月%d日", "%m/%d/%Y", "%d %B %Y"];

/// Parse any supported date spelling into ISO 8601.
pub fn normalize_date(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&collapsed, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn strip_zh_prefixes(value: &str) -> &str {
    let mut current = value;
    while let Some(rest) = ZH_REQUEST_PREFIXES
        .iter()
        .find_map(|p| current.strip_prefix(p).filter(|r| !r.is_empty()))
    {
        current = rest;
    }
    current
}

fn strip_zh_category_suffix(value: &str) -> &str {
    ZH_CATEGORY_SUFFIXES
        .iter()
        .find_map(|s| value.strip_suffix(s).filter(|r| !r.is_empty()))
        .unwrap_or(value)
}

fn first_keyword(rules: &[KeywordRule], lowered: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|rule| rule.pattern.is_match(lowered))
        .map(|rule| rule.value)
}

/// Pulls typed values out of free text.
///
/// For each entity type the patterns are tried in order and the first one
/// whose capture yields a usable value wins; later patterns for that type are
/// never consulted. Extraction is pure, so the same input always produces
/// the same bag.
pub struct EntityExtractor {
    tables: Arc<PatternTables>,
}

impl EntityExtractor {
    pub fn new(tables: Arc<PatternTables>) -> Self {
        Self { tables }
    }

    pub fn extract(&self, text: &str, language: Language) -> EntityBag {
        let mut entities = EntityBag::new();

        for (entity_type, patterns) in &self.tables.entities {
            if let Some(value) =
                self.first_match(*entity_type, patterns.for_language(language), text, language)
            {
                entities.insert(*entity_type, value);
            }
        }

        let lowered = text.to_lowercase();
        if let Some(status) = first_keyword(&self.tables.statuses, &lowered) {
            entities.insert(EntityType::Status, status);
        }
        if let Some(condition) = first_keyword(&self.tables.conditions, &lowered) {
            entities.insert(EntityType::Condition, condition);
        }
        if let Some(range) = self.extract_time_range(text) {
            entities.insert(EntityType::TimeRange, range.as_str());
        }

        debug!("Extracted entities from {:?}: {:?}", text, entities);
        entities
    }

    /// Type-independent scan for relative periods. The first listed range
    /// with any matching phrase wins.
    pub fn extract_time_range(&self, text: &str) -> Option<TimeRange> {
        let lowered = text.to_lowercase();
        self.tables
            .time_ranges
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(&lowered)))
            .map(|(range, _)| *range)
    }

    /// Canonical form of a value that did not come from the pattern cascades,
    /// such as an LLM reply. `None` when the value is unusable.
    pub fn normalize(&self, entity_type: EntityType, raw: &str, language: Language) -> Option<String> {
        match entity_type {
            EntityType::TimeRange => TimeRange::from_str(raw)
                .ok()
                .or_else(|| self.extract_time_range(raw))
                .map(|range| range.as_str().to_string()),
            EntityType::Status => self.keyword_or_raw(&self.tables.statuses, raw),
            EntityType::Condition => self.keyword_or_raw(&self.tables.conditions, raw),
            _ => self.post_process(entity_type, raw, language),
        }
    }

    fn keyword_or_raw(&self, rules: &[KeywordRule], raw: &str) -> Option<String> {
        let cleaned = sanitize_entity_value(raw);
        let value = first_keyword(rules, &cleaned.to_lowercase())
            .map(str::to_string)
            .unwrap_or_else(|| cleaned.trim().to_lowercase());
        (!value.is_empty()).then_some(value)
    }

    fn first_match(
        &self,
        entity_type: EntityType,
        patterns: &[Regex],
        text: &str,
        language: Language,
    ) -> Option<String> {
        patterns.iter().find_map(|pattern| {
            pattern.captures_iter(text).find_map(|caps| {
                caps.get(1)
                    .and_then(|m| self.post_process(entity_type, m.as_str(), language))
            })
        })
    }

    fn post_process(&self, entity_type: EntityType, raw: &str, language: Language) -> Option<String> {
        let cleaned = sanitize_entity_value(raw);
        let value = match entity_type {
            EntityType::AuthorName if language == Language::Zh => {
                strip_zh_prefixes(&cleaned).to_string()
            }
            EntityType::CategoryName => {
                let trimmed = if language == Language::Zh {
                    strip_zh_category_suffix(strip_zh_prefixes(&cleaned))
                } else {
                    cleaned.as_str()
                };
                self.tables.canonical_category(trimmed)
            }
            EntityType::Date => normalize_date(&cleaned)?,
            _ => cleaned,
        };
        let value = value.trim().to_string();
        (!value.is_empty()).then_some(value)
    }
}
