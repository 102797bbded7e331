//! Core value types of the natural-language query pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Classified purpose of a user question.
///
/// Variant order in [`Intent::ALL`] is the registration order used by the
/// pattern classifier to break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    QueryBookInventory,
    QueryBookByTitle,
    QueryBookByAuthor,
    QueryBookByCategory,
    QueryBorrowingRecords,
    QueryStudentBorrowing,
    QueryStatistics,
    QueryOverdueBooks,
    Unknown,
}

impl Intent {
    /// Every known intent, in registration order. `Unknown` is not listed.
    pub const ALL: [Intent; 8] = [
        Intent::QueryBookInventory,
        Intent::QueryBookByTitle,
        Intent::QueryBookByAuthor,
        Intent::QueryBookByCategory,
        Intent::QueryBorrowingRecords,
        Intent::QueryStudentBorrowing,
        Intent::QueryStatistics,
        Intent::QueryOverdueBooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::QueryBookInventory => "query_book_inventory",
            Intent::QueryBookByTitle => "query_book_by_title",
            Intent::QueryBookByAuthor => "query_book_by_author",
            Intent::QueryBookByCategory => "query_book_by_category",
            Intent::QueryBorrowingRecords => "query_borrowing_records",
            Intent::QueryStudentBorrowing => "query_student_borrowing",
            Intent::QueryStatistics => "query_statistics",
            Intent::QueryOverdueBooks => "query_overdue_books",
            Intent::Unknown => "unknown",
        }
    }

    /// Entity types that must be present before a query can be generated.
    pub fn required_entities(&self) -> &'static [EntityType] {
        match self {
            Intent::QueryBookByTitle => &[EntityType::BookTitle],
            Intent::QueryBookByAuthor => &[EntityType::AuthorName],
            Intent::QueryBookByCategory => &[EntityType::CategoryName],
            Intent::QueryStudentBorrowing => &[EntityType::StudentId],
            _ => &[],
        }
    }

    /// True for the intents that look up books rather than loans.
    pub fn is_book_lookup(&self) -> bool {
        matches!(
            self,
            Intent::QueryBookInventory
                | Intent::QueryBookByTitle
                | Intent::QueryBookByAuthor
                | Intent::QueryBookByCategory
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized == "unknown" {
            return Ok(Intent::Unknown);
        }
        Intent::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| format!("unsupported intent: {}", s))
    }
}

/// Typed slot of an [`EntityBag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    BookTitle,
    AuthorName,
    CategoryName,
    StudentId,
    Status,
    Condition,
    TimeRange,
    Date,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::BookTitle,
        EntityType::AuthorName,
        EntityType::CategoryName,
        EntityType::StudentId,
        EntityType::Status,
        EntityType::Condition,
        EntityType::TimeRange,
        EntityType::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::BookTitle => "book_title",
            EntityType::AuthorName => "author_name",
            EntityType::CategoryName => "category_name",
            EntityType::StudentId => "student_id",
            EntityType::Status => "status",
            EntityType::Condition => "condition",
            EntityType::TimeRange => "time_range",
            EntityType::Date => "date",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unsupported entity type: {}", s))
    }
}

/// Glyphs that never survive into an entity value.
const QUOTING_GLYPHS: &[char] = &[
    '《', '》', '〈', '〉', '「', '」', '『', '』', '"', '\'', '“', '”', '‘', '’', '`',
];

/// Trim a raw value and drop quoting/bracket glyphs.
pub fn sanitize_entity_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| !QUOTING_GLYPHS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// At most one value per entity type. Values are always sanitized and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<EntityType, String>",
    into = "BTreeMap<EntityType, String>"
)]
pub struct EntityBag(BTreeMap<EntityType, String>);

impl EntityBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, overwriting any previous one. Empty values are ignored.
    pub fn insert(&mut self, entity_type: EntityType, value: impl AsRef<str>) {
        let value = sanitize_entity_value(value.as_ref());
        if value.is_empty() {
            return;
        }
        self.0.insert(entity_type, value);
    }

    pub fn with(mut self, entity_type: EntityType, value: impl AsRef<str>) -> Self {
        self.insert(entity_type, value);
        self
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&str> {
        self.0.get(&entity_type).map(String::as_str)
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.get(entity_type).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn remove(&mut self, entity_type: EntityType) -> Option<String> {
        self.0.remove(&entity_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Fill entity types missing here from `other`; existing values win.
    pub fn fill_missing_from(&mut self, other: &EntityBag) {
        for (entity_type, value) in other.iter() {
            if !self.contains(entity_type) {
                self.insert(entity_type, value);
            }
        }
    }
}

impl From<BTreeMap<EntityType, String>> for EntityBag {
    fn from(map: BTreeMap<EntityType, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<EntityBag> for BTreeMap<EntityType, String> {
    fn from(bag: EntityBag) -> Self {
        bag.0
    }
}

impl FromIterator<(EntityType, String)> for EntityBag {
    fn from_iter<I: IntoIterator<Item = (EntityType, String)>>(iter: I) -> Self {
        let mut bag = EntityBag::new();
        for (entity_type, value) in iter {
            bag.insert(entity_type, value);
        }
        bag
    }
}

/// Relative period stored under the `time_range` entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
}

impl TimeRange {
    pub const ALL: [TimeRange; 6] = [
        TimeRange::ThisMonth,
        TimeRange::LastMonth,
        TimeRange::ThisYear,
        TimeRange::LastYear,
        TimeRange::Last7Days,
        TimeRange::Last30Days,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ThisMonth => "this_month",
            TimeRange::LastMonth => "last_month",
            TimeRange::ThisYear => "this_year",
            TimeRange::LastYear => "last_year",
            TimeRange::Last7Days => "last_7_days",
            TimeRange::Last30Days => "last_30_days",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TimeRange::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("unsupported time range: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "zh-cn" | "chinese" => Ok(Language::Zh),
            "en" | "english" => Ok(Language::En),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    RuleBased,
    LlmEnhanced,
    LlmFallbackToRules,
}

/// Output of the understanding stage. Built once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NluResult {
    pub intent: Intent,
    pub entities: EntityBag,
    pub confidence: f64,
    pub language: Language,
    pub original_text: String,
    pub processing_method: ProcessingMethod,
}

/// A bounded, parameterized query.
///
/// `query_text` never contains entity values; they travel in `params` in
/// placeholder order. `is_valid == false` means the text must not be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query_text: String,
    pub params: Vec<serde_json::Value>,
    pub is_valid: bool,
    pub missing_entities: Vec<EntityType>,
}

impl GeneratedQuery {
    pub fn invalid(missing_entities: Vec<EntityType>) -> Self {
        Self {
            query_text: String::new(),
            params: Vec::new(),
            is_valid: false,
            missing_entities,
        }
    }
}

/// Caller-supplied overrides applied on top of extracted entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub values: EntityBag,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Pins "today" for time-range resolution.
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
}

impl QueryParams {
    /// Override value if present, otherwise the extracted one.
    pub fn resolve<'a>(&'a self, entities: &'a EntityBag, entity_type: EntityType) -> Option<&'a str> {
        self.values
            .get(entity_type)
            .or_else(|| entities.get(entity_type))
    }
}

/// One result row: column name to value.
pub type Row = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trips_through_str() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert_eq!("UNKNOWN".parse::<Intent>().unwrap(), Intent::Unknown);
        assert!("query_everything".parse::<Intent>().is_err());
    }

    #[test]
    fn test_required_entities_are_fixed() {
        assert_eq!(
            Intent::QueryBookByTitle.required_entities(),
            &[EntityType::BookTitle]
        );
        assert!(Intent::QueryStatistics.required_entities().is_empty());
        assert!(Intent::QueryOverdueBooks.required_entities().is_empty());
    }

    #[test]
    fn test_entity_bag_sanitizes_values() {
        let mut bag = EntityBag::new();
        bag.insert(EntityType::BookTitle, "  《三体》 ");
        bag.insert(EntityType::AuthorName, "   ");
        assert_eq!(bag.get(EntityType::BookTitle), Some("三体"));
        assert!(!bag.contains(EntityType::AuthorName));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_entity_bag_serializes_snake_case_keys() {
        let bag = EntityBag::new().with(EntityType::AuthorName, "Liu Cixin");
        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json, serde_json::json!({"author_name": "Liu Cixin"}));

        let parsed: EntityBag =
            serde_json::from_value(serde_json::json!({"book_title": " 《三体》"})).unwrap();
        assert_eq!(parsed.get(EntityType::BookTitle), Some("三体"));
    }

    #[test]
    fn test_fill_missing_keeps_existing_values() {
        let mut current = EntityBag::new().with(EntityType::BookTitle, "三体");
        let previous = EntityBag::new()
            .with(EntityType::BookTitle, "红楼梦")
            .with(EntityType::TimeRange, "this_month");
        current.fill_missing_from(&previous);
        assert_eq!(current.get(EntityType::BookTitle), Some("三体"));
        assert_eq!(current.get(EntityType::TimeRange), Some("this_month"));
    }

    #[test]
    fn test_params_override_entities() {
        let entities = EntityBag::new().with(EntityType::AuthorName, "Liu Cixin");
        let params = QueryParams {
            values: EntityBag::new().with(EntityType::AuthorName, "Lu Xun"),
            ..Default::default()
        };
        assert_eq!(params.resolve(&entities, EntityType::AuthorName), Some("Lu Xun"));
        assert_eq!(
            QueryParams::default().resolve(&entities, EntityType::AuthorName),
            Some("Liu Cixin")
        );
    }
}
