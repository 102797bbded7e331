//! Intent-specific projections of raw result rows.

use crate::domain::query::{Intent, Language, Row};
use crate::domain::response::FormattedRecord;
use serde_json::{Map, Value};

/// (output key, source column) pairs, in output order.
type Projection = &'static [(&'static str, &'static str)];

const INVENTORY_FIELDS: Projection = &[
    ("copy_id", "copy_id"),
    ("title", "title"),
    ("author", "author_name"),
    ("category", "category_name"),
    ("status", "status"),
    ("condition", "condition"),
    ("call_number", "call_number"),
    ("location", "shelf_location"),
];

const BOOK_FIELDS: Projection = &[
    ("book_id", "book_id"),
    ("title", "title"),
    ("author", "author_name"),
    ("category", "category_name"),
    ("publication_year", "publication_year"),
    ("total_copies", "total_copies"),
    ("available_copies", "available_copies"),
];

const BORROWING_FIELDS: Projection = &[
    ("borrow_id", "borrow_id"),
    ("student_name", "student_name"),
    ("student_id", "matric_number"),
    ("book_title", "book_title"),
    ("author", "author_name"),
    ("borrow_date", "borrow_date"),
    ("due_date", "due_date"),
    ("return_date", "return_date"),
];

const STATISTICS_FIELDS: Projection = &[
    ("title", "title"),
    ("author", "author_name"),
    ("category", "category_name"),
    ("borrow_count", "borrow_count"),
    ("unique_borrowers", "unique_borrowers"),
];

const OVERDUE_FIELDS: Projection = &[
    ("borrow_id", "borrow_id"),
    ("student_name", "student_name"),
    ("student_id", "matric_number"),
    ("book_title", "book_title"),
    ("author", "author_name"),
    ("due_date", "due_date"),
    ("days_overdue", "days_overdue"),
    ("call_number", "call_number"),
];

/// Localized label for a copy or loan status.
pub fn status_label(status: &str, language: Language) -> String {
    let label = match (language, status) {
        (Language::Zh, "available") => "可借",
        (Language::Zh, "borrowed") => "已借出",
        (Language::Zh, "missing") => "丢失",
        (Language::Zh, "returned") => "已归还",
        (Language::Zh, "overdue") => "逾期",
        (_, other) => other,
    };
    label.to_string()
}

fn column(row: &Row, name: &str) -> Value {
    row.get(name).cloned().unwrap_or(Value::Null)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn project(row: &Row, projection: Projection) -> Map<String, Value> {
    projection
        .iter()
        .map(|(key, source)| (key.to_string(), column(row, source)))
        .collect()
}

fn count(fields: &Map<String, Value>, key: &str) -> i64 {
    fields.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn text(fields: &Map<String, Value>, key: &str) -> String {
    fields.get(key).map(display).unwrap_or_default()
}

fn format_inventory(row: &Row, language: Language) -> FormattedRecord {
    let fields = project(row, INVENTORY_FIELDS);
    let display_text = format!(
        "{} - {} ({})",
        text(&fields, "title"),
        text(&fields, "author"),
        status_label(&text(&fields, "status"), language)
    );
    FormattedRecord { fields, display_text }
}

fn format_book(row: &Row, _language: Language) -> FormattedRecord {
    let mut fields = project(row, BOOK_FIELDS);
    for key in ["total_copies", "available_copies"] {
        if fields.get(key).is_some_and(Value::is_null) {
            fields.insert(key.to_string(), Value::from(0));
        }
    }
    let year = match text(&fields, "publication_year") {
        y if y.is_empty() => "N/A".to_string(),
        y => y,
    };
    let display_text = format!(
        "{} - {} ({})",
        text(&fields, "title"),
        text(&fields, "author"),
        year
    );
    FormattedRecord { fields, display_text }
}

/// Loan rows prefer the computed status when the query provides one.
fn format_borrowing(row: &Row, language: Language) -> FormattedRecord {
    let mut fields = project(row, BORROWING_FIELDS);
    let status = match column(row, "computed_status") {
        Value::Null => column(row, "status"),
        computed => computed,
    };
    let display_text = format!(
        "{} - {} ({})",
        text(&fields, "student_name"),
        text(&fields, "book_title"),
        status_label(&display(&status), language)
    );
    fields.insert("status".to_string(), status);
    FormattedRecord { fields, display_text }
}

fn format_statistics(row: &Row, language: Language) -> FormattedRecord {
    let fields = project(row, STATISTICS_FIELDS);
    let title = text(&fields, "title");
    let borrows = count(&fields, "borrow_count");
    let display_text = match language {
        Language::Zh => format!("{} - 借阅 {} 次", title, borrows),
        Language::En => format!("{} - borrowed {} times", title, borrows),
    };
    FormattedRecord { fields, display_text }
}

fn format_overdue(row: &Row, language: Language) -> FormattedRecord {
    let fields = project(row, OVERDUE_FIELDS);
    let student = text(&fields, "student_name");
    let title = text(&fields, "book_title");
    let days = count(&fields, "days_overdue");
    let display_text = match language {
        Language::Zh => format!("{} - {} (逾期 {} 天)", student, title, days),
        Language::En => format!("{} - {} ({} days overdue)", student, title, days),
    };
    FormattedRecord { fields, display_text }
}

fn pass_through(row: &Row, _language: Language) -> FormattedRecord {
    FormattedRecord {
        fields: row.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        display_text: String::new(),
    }
}

/// Project `rows` for `intent`. Rows of unmapped intents pass through unchanged.
pub fn format_results(intent: Intent, rows: &[Row], language: Language) -> Vec<FormattedRecord> {
    let formatter: fn(&Row, Language) -> FormattedRecord = match intent {
        Intent::QueryBookInventory | Intent::QueryBookByTitle => format_inventory,
        Intent::QueryBookByAuthor | Intent::QueryBookByCategory => format_book,
        Intent::QueryBorrowingRecords | Intent::QueryStudentBorrowing => format_borrowing,
        Intent::QueryStatistics => format_statistics,
        Intent::QueryOverdueBooks => format_overdue,
        Intent::Unknown => pass_through,
    };
    rows.iter().map(|row| formatter(row, language)).collect()
}
