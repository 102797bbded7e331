//! Template-based SQL generation.
//!
//! Each intent owns one SELECT template. Optional conditions are `{slot}`
//! markers filled by the filter builders; every entity value is bound as a
//! parameter and never spliced into the text. The result always carries a
//! LIMIT and passes the denylist before it is returned.

use crate::application::use_cases::entity_validator::validate_entities;
use crate::application::use_cases::filter_builders::{DbType, FilterContext, FilterSlot};
use crate::application::use_cases::security_guard::check_denylist;
use crate::domain::app_config::QueryConfig;
use crate::domain::error::QueryError;
use crate::domain::query::{EntityBag, GeneratedQuery, Intent, QueryParams};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static EMPTY_WHERE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WHERE\s+1=1\s+(ORDER|GROUP)\b").unwrap());
static LEADING_AND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WHERE\s+1=1\s+AND\s+").unwrap());
static DOUBLE_AND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AND\s+AND\s+").unwrap());
static TRAILING_WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*WHERE\s+1=1\s*$").unwrap());
static LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap());

const INVENTORY_TEMPLATE: &str = "
    SELECT bc.copy_id, b.title, a.author_name, c.category_name,
           bc.status, bc.condition, bc.call_number, bc.shelf_location
    FROM book_copies bc
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    WHERE 1=1
    {book_title_filter}
    {copy_status_filter}
    {condition_filter}
    ORDER BY b.title
    LIMIT {limit}";

const TITLE_TEMPLATE: &str = "
    SELECT bc.copy_id, b.book_id, b.title, a.author_name, c.category_name,
           bc.status, bc.condition, bc.call_number, bc.shelf_location
    FROM book_copies bc
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    WHERE 1=1
    {book_title_filter}
    {copy_status_filter}
    {condition_filter}
    ORDER BY b.title
    LIMIT {limit}";

const AUTHOR_TEMPLATE: &str = "
    SELECT b.book_id, b.title, a.author_name, c.category_name, b.publication_year,
           COUNT(bc.copy_id) AS total_copies,
           COUNT(CASE WHEN bc.status = 'available' THEN 1 END) AS available_copies
    FROM books b
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    LEFT JOIN book_copies bc ON b.book_id = bc.book_id
    WHERE 1=1
    {author_filter}
    {category_filter}
    GROUP BY b.book_id, b.title, a.author_name, c.category_name, b.publication_year
    ORDER BY b.title
    LIMIT {limit}";

const CATEGORY_TEMPLATE: &str = "
    SELECT b.book_id, b.title, a.author_name, c.category_name, b.publication_year,
           COUNT(bc.copy_id) AS total_copies,
           COUNT(CASE WHEN bc.status = 'available' THEN 1 END) AS available_copies
    FROM books b
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    LEFT JOIN book_copies bc ON b.book_id = bc.book_id
    WHERE 1=1
    {category_filter}
    {author_filter}
    GROUP BY b.book_id, b.title, a.author_name, c.category_name, b.publication_year
    ORDER BY b.title
    LIMIT {limit}";

const BORROWING_TEMPLATE: &str = "
    SELECT br.borrow_id, s.full_name AS student_name, s.matric_number,
           b.title AS book_title, a.author_name, c.category_name,
           br.borrow_date, br.due_date, br.return_date, br.status
    FROM borrowing_records br
    JOIN students s ON br.student_id = s.student_id
    JOIN book_copies bc ON br.copy_id = bc.copy_id
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    WHERE 1=1
    {student_filter}
    {book_title_filter}
    {author_filter}
    {category_filter}
    {date_range_filter}
    {borrow_status_filter}
    ORDER BY br.borrow_date DESC
    LIMIT {limit}";

const STUDENT_TEMPLATE: &str = "
    SELECT br.borrow_id, s.full_name AS student_name, s.matric_number,
           b.title AS book_title, a.author_name,
           br.borrow_date, br.due_date, br.return_date, br.status,
           CASE WHEN br.return_date IS NULL AND br.due_date < CURRENT_DATE
                THEN 'overdue' ELSE {status_text} END AS computed_status
    FROM borrowing_records br
    JOIN students s ON br.student_id = s.student_id
    JOIN book_copies bc ON br.copy_id = bc.copy_id
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    WHERE 1=1
    {student_filter}
    {date_range_filter}
    {borrow_status_filter}
    ORDER BY br.borrow_date DESC
    LIMIT {limit}";

const STATISTICS_TEMPLATE: &str = "
    SELECT 'popular_books' AS metric_type, b.title, a.author_name, c.category_name,
           COUNT(br.borrow_id) AS borrow_count,
           COUNT(DISTINCT s.student_id) AS unique_borrowers
    FROM borrowing_records br
    JOIN book_copies bc ON br.copy_id = bc.copy_id
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    JOIN categories c ON b.category_id = c.category_id
    JOIN students s ON br.student_id = s.student_id
    WHERE 1=1
    {date_range_filter}
    {book_title_filter}
    {author_filter}
    {category_filter}
    GROUP BY b.book_id, b.title, a.author_name, c.category_name
    ORDER BY borrow_count DESC
    LIMIT {limit}";

const OVERDUE_TEMPLATE: &str = "
    SELECT br.borrow_id, s.full_name AS student_name, s.matric_number,
           b.title AS book_title, a.author_name,
           br.borrow_date, br.due_date,
           {days_overdue} AS days_overdue,
           bc.call_number
    FROM borrowing_records br
    JOIN students s ON br.student_id = s.student_id
    JOIN book_copies bc ON br.copy_id = bc.copy_id
    JOIN books b ON bc.book_id = b.book_id
    JOIN authors a ON b.author_id = a.author_id
    WHERE {status_text} <> 'returned'
    AND br.due_date < CURRENT_DATE
    AND br.return_date IS NULL
    {date_range_filter}
    ORDER BY br.due_date ASC
    LIMIT {limit}";

/// Template text for `intent`, or `None` for `Unknown`.
pub fn template_for(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::QueryBookInventory => Some(INVENTORY_TEMPLATE),
        Intent::QueryBookByTitle => Some(TITLE_TEMPLATE),
        Intent::QueryBookByAuthor => Some(AUTHOR_TEMPLATE),
        Intent::QueryBookByCategory => Some(CATEGORY_TEMPLATE),
        Intent::QueryBorrowingRecords => Some(BORROWING_TEMPLATE),
        Intent::QueryStudentBorrowing => Some(STUDENT_TEMPLATE),
        Intent::QueryStatistics => Some(STATISTICS_TEMPLATE),
        Intent::QueryOverdueBooks => Some(OVERDUE_TEMPLATE),
        Intent::Unknown => None,
    }
}

/// Collapse whitespace and remove the `WHERE 1=1` scaffolding left by empty slots.
pub fn clean_sql(sql: &str) -> String {
    let sql = WHITESPACE_RE.replace_all(sql, " ");
    let sql = EMPTY_WHERE_RE.replace_all(&sql, "$1");
    let sql = DOUBLE_AND_RE.replace_all(&sql, " AND ");
    let sql = LEADING_AND_RE.replace_all(&sql, "WHERE ");
    let sql = TRAILING_WHERE_RE.replace_all(&sql, "");
    sql.trim().to_string()
}

/// Append a row cap when the text has none. Statistics queries are left alone.
pub fn ensure_limit(sql: &str, intent: Intent, limit: u32) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if intent == Intent::QueryStatistics || LIMIT_RE.is_match(sql) {
        sql.to_string()
    } else {
        format!("{} LIMIT {}", sql, limit)
    }
}

/// Row caps applied during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub statistics_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for QueryLimits {
    fn from(config: &QueryConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            statistics_limit: config.statistics_limit,
            max_limit: config.max_limit,
        }
    }
}

pub struct SqlTemplateGenerator {
    db_type: DbType,
    limits: QueryLimits,
}

impl SqlTemplateGenerator {
    pub fn new(db_type: DbType, limits: QueryLimits) -> Self {
        Self { db_type, limits }
    }

    pub fn postgres() -> Self {
        Self::new(DbType::Postgres, QueryLimits::default())
    }

    pub fn sqlite() -> Self {
        Self::new(DbType::Sqlite, QueryLimits::default())
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Caller limit clamped to `1..=max_limit`, else the intent's default.
    pub fn effective_limit(&self, intent: Intent, params: &QueryParams) -> u32 {
        let default = if intent == Intent::QueryStatistics {
            self.limits.statistics_limit
        } else {
            self.limits.default_limit
        };
        params
            .limit
            .unwrap_or(default)
            .clamp(1, self.limits.max_limit.max(1))
    }

    /// Fill the intent's template from entities and caller overrides.
    ///
    /// Missing required entities produce an invalid query rather than an
    /// error so callers can report what is missing.
    pub fn generate(
        &self,
        intent: Intent,
        entities: &EntityBag,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, QueryError> {
        let template = template_for(intent).ok_or(QueryError::UnknownIntent)?;

        let mut merged = entities.clone();
        for (entity_type, value) in params.values.iter() {
            merged.insert(entity_type, value);
        }
        let validation = validate_entities(intent, &merged);
        if !validation.valid {
            debug!("Cannot generate {}: missing {:?}", intent, validation.missing);
            return Ok(GeneratedQuery::invalid(validation.missing));
        }

        let ctx = FilterContext {
            entities,
            params,
            dialect: self.db_type,
            today: params
                .reference_date
                .unwrap_or_else(|| Local::now().date_naive()),
        };
        let limit = self.effective_limit(intent, params);

        let (filled, bound) = self.fill_template(template, &ctx, limit)?;
        let sql = self.number_placeholders(&clean_sql(&filled));

        check_denylist(&sql)?;
        debug!("Generated SQL for {}: {} ({} params)", intent, sql, bound.len());

        Ok(GeneratedQuery {
            query_text: sql,
            params: bound,
            is_valid: true,
            missing_entities: Vec::new(),
        })
    }

    /// Substitute tokens in order of appearance so bound values line up
    /// with placeholders.
    fn fill_template(
        &self,
        template: &str,
        ctx: &FilterContext<'_>,
        limit: u32,
    ) -> Result<(String, Vec<Value>), QueryError> {
        let mut out = String::with_capacity(template.len());
        let mut bound = Vec::new();
        let mut last = 0;

        for caps in TOKEN_RE.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            last = whole.end();

            match name.as_str() {
                "limit" => out.push_str(&limit.to_string()),
                "status_text" => out.push_str(&self.db_type.text("br.status")),
                "days_overdue" => out.push_str(self.db_type.days_overdue()),
                other => {
                    let slot = FilterSlot::from_placeholder(other).ok_or_else(|| {
                        warn!("Template references unknown slot {}", other);
                        QueryError::QueryGenerationFailure(format!("unknown template slot: {}", other))
                    })?;
                    if let Some(fragment) = slot.build(ctx) {
                        out.push_str(&fragment.sql);
                        bound.extend(fragment.params);
                    }
                }
            }
        }
        out.push_str(&template[last..]);

        Ok((out, bound))
    }

    fn get_placeholder(&self, index: usize) -> String {
        match self.db_type {
            DbType::Postgres => format!("${}", index),
            DbType::Sqlite => "?".to_string(),
        }
    }

    fn number_placeholders(&self, sql: &str) -> String {
        if self.db_type == DbType::Sqlite {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        for ch in sql.chars() {
            if ch == '?' {
                index += 1;
                out.push_str(&self.get_placeholder(index));
            } else {
                out.push(ch);
            }
        }
        out
    }
}
