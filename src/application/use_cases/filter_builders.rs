//! Composable WHERE-clause fragments.
//!
//! Every builder is a pure function of the entities, the caller overrides and
//! the dialect. Fragments use `?` placeholders and carry their values
//! separately; the template generator renumbers placeholders per dialect.

use crate::domain::query::{EntityBag, EntityType, QueryParams, TimeRange};
use chrono::{Datelike, Duration, NaiveDate};
use serde_json::Value;
use std::str::FromStr;

/// Target database type for SQL generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl DbType {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres") {
            Some(DbType::Postgres)
        } else if url.starts_with("sqlite") {
            Some(DbType::Sqlite)
        } else {
            None
        }
    }

    /// Case-insensitive pattern match of `column` against one bound,
    /// backslash-escaped pattern.
    pub fn like(&self, column: &str) -> String {
        let op = match self {
            DbType::Postgres => "ILIKE",
            DbType::Sqlite => "LIKE",
        };
        format!("{} {} ? ESCAPE '\\'", column, op)
    }

    /// Column compared as plain text (Postgres status columns may be enums)
    pub fn text(&self, column: &str) -> String {
        match self {
            DbType::Postgres => format!("{}::text", column),
            DbType::Sqlite => column.to_string(),
        }
    }

    /// Placeholder for a bound ISO date string
    pub fn date_param(&self) -> &'static str {
        match self {
            DbType::Postgres => "CAST(? AS DATE)",
            DbType::Sqlite => "?",
        }
    }

    pub fn days_overdue(&self) -> &'static str {
        match self {
            DbType::Postgres => "CURRENT_DATE - br.due_date::date",
            DbType::Sqlite => "CAST(julianday('now') - julianday(br.due_date) AS INTEGER)",
        }
    }
}

/// Inputs shared by every filter builder.
pub struct FilterContext<'a> {
    pub entities: &'a EntityBag,
    pub params: &'a QueryParams,
    pub dialect: DbType,
    pub today: NaiveDate,
}

impl<'a> FilterContext<'a> {
    fn value(&self, entity_type: EntityType) -> Option<&'a str> {
        self.params
            .resolve(self.entities, entity_type)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// One `AND ...` fragment plus its bound values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Fragment {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// Named slot of a query template, written `{name}` in template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSlot {
    BookTitle,
    Author,
    Category,
    Student,
    CopyStatus,
    BorrowStatus,
    Condition,
    DateRange,
}

impl FilterSlot {
    pub const ALL: [FilterSlot; 8] = [
        FilterSlot::BookTitle,
        FilterSlot::Author,
        FilterSlot::Category,
        FilterSlot::Student,
        FilterSlot::CopyStatus,
        FilterSlot::BorrowStatus,
        FilterSlot::Condition,
        FilterSlot::DateRange,
    ];

    pub fn placeholder(&self) -> &'static str {
        match self {
            FilterSlot::BookTitle => "book_title_filter",
            FilterSlot::Author => "author_filter",
            FilterSlot::Category => "category_filter",
            FilterSlot::Student => "student_filter",
            FilterSlot::CopyStatus => "copy_status_filter",
            FilterSlot::BorrowStatus => "borrow_status_filter",
            FilterSlot::Condition => "condition_filter",
            FilterSlot::DateRange => "date_range_filter",
        }
    }

    pub fn from_placeholder(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.placeholder() == name)
    }

    pub fn build(&self, ctx: &FilterContext<'_>) -> Option<Fragment> {
        match self {
            FilterSlot::BookTitle => build_book_title_filter(ctx),
            FilterSlot::Author => build_author_filter(ctx),
            FilterSlot::Category => build_category_filter(ctx),
            FilterSlot::Student => build_student_filter(ctx),
            FilterSlot::CopyStatus => build_copy_status_filter(ctx),
            FilterSlot::BorrowStatus => build_borrow_status_filter(ctx),
            FilterSlot::Condition => build_condition_filter(ctx),
            FilterSlot::DateRange => build_date_range_filter(ctx),
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Substring pattern; wildcards in `value` match literally.
fn contains(value: &str) -> Value {
    Value::String(format!("%{}%", escape_like(value)))
}

pub fn build_book_title_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    let title = ctx.value(EntityType::BookTitle)?;
    Some(Fragment::new(
        format!("AND {}", ctx.dialect.like("b.title")),
        vec![contains(title)],
    ))
}

pub fn build_author_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    let author = ctx.value(EntityType::AuthorName)?;
    Some(Fragment::new(
        format!("AND {}", ctx.dialect.like("a.author_name")),
        vec![contains(author)],
    ))
}

pub fn build_category_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    let category = ctx.value(EntityType::CategoryName)?;
    Some(Fragment::new(
        format!("AND {}", ctx.dialect.like("c.category_name")),
        vec![contains(category)],
    ))
}

/// Matches either the student number or part of the student's name.
pub fn build_student_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    let student = ctx.value(EntityType::StudentId)?;
    Some(Fragment::new(
        format!(
            "AND (UPPER(s.matric_number) = UPPER(?) OR {})",
            ctx.dialect.like("s.full_name")
        ),
        vec![Value::String(student.to_string()), contains(student)],
    ))
}

const COPY_STATUSES: &[&str] = &["available", "borrowed", "missing"];
const BORROW_STATUSES: &[&str] = &["borrowed", "returned", "overdue"];
const CONDITIONS: &[&str] = &["good", "fair", "poor"];

fn enumerated_filter(
    ctx: &FilterContext<'_>,
    entity_type: EntityType,
    allowed: &[&str],
    column: &str,
) -> Option<Fragment> {
    let value = ctx.value(entity_type)?.to_lowercase();
    if !allowed.contains(&value.as_str()) {
        return None;
    }
    Some(Fragment::new(
        format!("AND {} = ?", ctx.dialect.text(column)),
        vec![Value::String(value)],
    ))
}

/// Status of a physical copy. Loan-only statuses produce no fragment.
pub fn build_copy_status_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    enumerated_filter(ctx, EntityType::Status, COPY_STATUSES, "bc.status")
}

/// Status of a loan. Copy-only statuses produce no fragment.
pub fn build_borrow_status_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    enumerated_filter(ctx, EntityType::Status, BORROW_STATUSES, "br.status")
}

pub fn build_condition_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    enumerated_filter(ctx, EntityType::Condition, CONDITIONS, "bc.condition")
}

/// Borrow-date filter. Precedence: time range, then exact date, then the
/// caller's start/end dates.
pub fn build_date_range_filter(ctx: &FilterContext<'_>) -> Option<Fragment> {
    let date_param = ctx.dialect.date_param();
    let iso = |d: NaiveDate| Value::String(d.format("%Y-%m-%d").to_string());

    if let Some(range) = ctx
        .value(EntityType::TimeRange)
        .and_then(|v| TimeRange::from_str(v).ok())
    {
        let (start, end) = resolve_time_range(range, ctx.today);
        return Some(Fragment::new(
            format!("AND DATE(br.borrow_date) BETWEEN {} AND {}", date_param, date_param),
            vec![iso(start), iso(end)],
        ));
    }

    if let Some(date) = ctx
        .value(EntityType::Date)
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
    {
        return Some(Fragment::new(
            format!("AND DATE(br.borrow_date) = {}", date_param),
            vec![iso(date)],
        ));
    }

    match (ctx.params.start_date, ctx.params.end_date) {
        (Some(start), Some(end)) => Some(Fragment::new(
            format!("AND DATE(br.borrow_date) BETWEEN {} AND {}", date_param, date_param),
            vec![iso(start), iso(end)],
        )),
        (Some(start), None) => Some(Fragment::new(
            format!("AND DATE(br.borrow_date) >= {}", date_param),
            vec![iso(start)],
        )),
        (None, Some(end)) => Some(Fragment::new(
            format!("AND DATE(br.borrow_date) <= {}", date_param),
            vec![iso(end)],
        )),
        (None, None) => None,
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    let first = first_of_month(date);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next.and_then(|n| n.pred_opt()).unwrap_or(date)
}

fn year_bounds(year: i32, fallback: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(fallback),
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(fallback),
    )
}

/// Inclusive calendar bounds of `range` relative to `today`.
pub fn resolve_time_range(range: TimeRange, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    match range {
        TimeRange::ThisMonth => (first_of_month(today), last_of_month(today)),
        TimeRange::LastMonth => {
            let end = first_of_month(today).pred_opt().unwrap_or(today);
            (first_of_month(end), end)
        }
        TimeRange::ThisYear => year_bounds(today.year(), today),
        TimeRange::LastYear => year_bounds(today.year() - 1, today),
        TimeRange::Last7Days => (today - Duration::days(7), today),
        TimeRange::Last30Days => (today - Duration::days(30), today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx<'a>(entities: &'a EntityBag, params: &'a QueryParams, dialect: DbType) -> FilterContext<'a> {
        FilterContext {
            entities,
            params,
            dialect,
            today: date(2024, 3, 15),
        }
    }

    #[test]
    fn test_resolve_time_ranges() {
        let today = date(2024, 3, 15);
        assert_eq!(
            resolve_time_range(TimeRange::ThisMonth, today),
            (date(2024, 3, 1), date(2024, 3, 31))
        );
        assert_eq!(
            resolve_time_range(TimeRange::LastMonth, today),
            (date(2024, 2, 1), date(2024, 2, 29))
        );
        assert_eq!(
            resolve_time_range(TimeRange::LastMonth, date(2024, 1, 10)),
            (date(2023, 12, 1), date(2023, 12, 31))
        );
        assert_eq!(
            resolve_time_range(TimeRange::ThisMonth, date(2023, 12, 5)),
            (date(2023, 12, 1), date(2023, 12, 31))
        );
        assert_eq!(
            resolve_time_range(TimeRange::LastYear, today),
            (date(2023, 1, 1), date(2023, 12, 31))
        );
        assert_eq!(
            resolve_time_range(TimeRange::Last7Days, today),
            (date(2024, 3, 8), today)
        );
    }

    #[test]
    fn test_title_filter_binds_value() {
        let entities = EntityBag::new().with(EntityType::BookTitle, "三体");
        let params = QueryParams::default();
        let fragment = build_book_title_filter(&ctx(&entities, &params, DbType::Postgres)).unwrap();
        assert_eq!(fragment.sql, "AND b.title ILIKE ? ESCAPE '\\'");
        assert_eq!(fragment.params, vec![Value::String("%三体%".into())]);
        assert!(!fragment.sql.contains("三体"));
    }

    #[test]
    fn test_like_wildcards_in_input_are_literal() {
        let entities = EntityBag::new().with(EntityType::AuthorName, "100%_a\\b");
        let params = QueryParams::default();
        let fragment = build_author_filter(&ctx(&entities, &params, DbType::Sqlite)).unwrap();
        assert_eq!(fragment.sql, "AND a.author_name LIKE ? ESCAPE '\\'");
        assert_eq!(fragment.params, vec![Value::String("%100\\%\\_a\\\\b%".into())]);
    }

    #[test]
    fn test_absent_entity_yields_no_fragment() {
        let entities = EntityBag::new();
        let params = QueryParams::default();
        let c = ctx(&entities, &params, DbType::Sqlite);
        for slot in FilterSlot::ALL {
            assert!(slot.build(&c).is_none(), "{:?}", slot);
        }
    }

    #[test]
    fn test_status_routes_to_matching_table() {
        let params = QueryParams::default();
        let available = EntityBag::new().with(EntityType::Status, "available");
        let c = ctx(&available, &params, DbType::Postgres);
        assert_eq!(
            build_copy_status_filter(&c).unwrap().sql,
            "AND bc.status::text = ?"
        );
        assert!(build_borrow_status_filter(&c).is_none());

        let returned = EntityBag::new().with(EntityType::Status, "returned");
        let c = ctx(&returned, &params, DbType::Sqlite);
        assert!(build_copy_status_filter(&c).is_none());
        assert_eq!(build_borrow_status_filter(&c).unwrap().sql, "AND br.status = ?");

        let bogus = EntityBag::new().with(EntityType::Status, "'; drop table x");
        let c = ctx(&bogus, &params, DbType::Sqlite);
        assert!(build_copy_status_filter(&c).is_none());
        assert!(build_borrow_status_filter(&c).is_none());
    }

    #[test]
    fn test_date_range_precedence() {
        let params = QueryParams {
            start_date: Some(date(2024, 1, 1)),
            end_date: Some(date(2024, 1, 31)),
            ..Default::default()
        };

        let with_range = EntityBag::new()
            .with(EntityType::TimeRange, "last_month")
            .with(EntityType::Date, "2024-03-01");
        let fragment = build_date_range_filter(&ctx(&with_range, &params, DbType::Sqlite)).unwrap();
        assert_eq!(fragment.sql, "AND DATE(br.borrow_date) BETWEEN ? AND ?");
        assert_eq!(
            fragment.params,
            vec![Value::String("2024-02-01".into()), Value::String("2024-02-29".into())]
        );

        let with_date = EntityBag::new().with(EntityType::Date, "2024-03-01");
        let fragment = build_date_range_filter(&ctx(&with_date, &params, DbType::Postgres)).unwrap();
        assert_eq!(fragment.sql, "AND DATE(br.borrow_date) = CAST(? AS DATE)");

        let empty = EntityBag::new();
        let fragment = build_date_range_filter(&ctx(&empty, &params, DbType::Sqlite)).unwrap();
        assert_eq!(
            fragment.params,
            vec![Value::String("2024-01-01".into()), Value::String("2024-01-31".into())]
        );
    }

    #[test]
    fn test_caller_override_wins() {
        let entities = EntityBag::new().with(EntityType::AuthorName, "Liu Cixin");
        let params = QueryParams {
            values: EntityBag::new().with(EntityType::AuthorName, "鲁迅"),
            ..Default::default()
        };
        let fragment = build_author_filter(&ctx(&entities, &params, DbType::Sqlite)).unwrap();
        assert_eq!(fragment.params, vec![Value::String("%鲁迅%".into())]);
    }

    #[test]
    fn test_student_filter_matches_number_or_name() {
        let entities = EntityBag::new().with(EntityType::StudentId, "A1234567B");
        let params = QueryParams::default();
        let fragment = build_student_filter(&ctx(&entities, &params, DbType::Sqlite)).unwrap();
        assert_eq!(fragment.params.len(), 2);
        assert!(fragment.sql.contains("UPPER(s.matric_number) = UPPER(?)"));
    }
}
