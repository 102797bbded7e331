//! Last line of defense before a query reaches the database.
//!
//! Template queries bind every value, so these checks only ever look at query
//! text. LLM-written SQL additionally has to be a single read-only SELECT.

use crate::domain::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static DENYLIST: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i);\s*(drop|delete|truncate|alter|create|insert|update|grant|revoke|attach|detach|pragma)\b",
            "stacked statement",
        ),
        (r"(?i)\bunion\s+(all\s+)?select\b", "UNION SELECT"),
        (r"--", "line comment"),
        (r"/\*", "block comment"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("invalid denylist regex"), reason))
    .collect()
});

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "PRAGMA", "ATTACH", "DETACH",
];

/// Reject query text matching any denylist pattern.
pub fn check_denylist(sql: &str) -> Result<()> {
    if let Some((_, reason)) = DENYLIST.iter().find(|(re, _)| re.is_match(sql)) {
        return Err(AppError::SecurityError(format!(
            "Query text rejected: {}",
            reason
        )));
    }
    Ok(())
}

/// Require a single SELECT free of write or schema keywords.
pub fn verify_select_only(sql: &str) -> Result<()> {
    let sql_upper = sql.trim().to_uppercase();

    if !sql_upper.starts_with("SELECT") && !sql_upper.starts_with("WITH") {
        return Err(AppError::SecurityError(
            "Query must start with SELECT".to_string(),
        ));
    }

    if sql_upper.trim_end_matches(';').contains(';') {
        return Err(AppError::SecurityError(
            "Multiple statements are not allowed".to_string(),
        ));
    }

    for keyword in FORBIDDEN_KEYWORDS {
        if contains_whole_word(&sql_upper, keyword) {
            return Err(AppError::SecurityError(format!(
                "SQL contains forbidden keyword: {}",
                keyword
            )));
        }
    }

    Ok(())
}

/// Both checks, for SQL that did not come from a template.
pub fn verify_untrusted_sql(sql: &str) -> Result<()> {
    check_denylist(sql)?;
    verify_select_only(sql)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// True if `keyword` occurs in `text` with no identifier characters on either side.
fn contains_whole_word(text: &str, keyword: &str) -> bool {
    let text_bytes = text.as_bytes();
    let keyword_bytes = keyword.as_bytes();
    if keyword_bytes.len() > text_bytes.len() {
        return false;
    }

    (0..=text_bytes.len() - keyword_bytes.len()).any(|i| {
        let end = i + keyword_bytes.len();
        &text_bytes[i..end] == keyword_bytes
            && (i == 0 || !is_word_byte(text_bytes[i - 1]))
            && (end == text_bytes.len() || !is_word_byte(text_bytes[end]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylist_rejects_injection_shapes() {
        for sql in [
            "SELECT 1; DROP TABLE books",
            "SELECT 1 ;\n delete from books",
            "SELECT title FROM books UNION ALL SELECT password FROM users",
            "SELECT 1 -- comment",
            "SELECT /* hidden */ 1",
        ] {
            assert!(check_denylist(sql).is_err(), "{}", sql);
        }
    }

    #[test]
    fn test_denylist_accepts_parameterized_select() {
        assert!(check_denylist("SELECT b.title FROM books b WHERE b.title LIKE ? LIMIT 50").is_ok());
    }

    #[test]
    fn test_select_only() {
        assert!(verify_select_only("SELECT created_at, updated_by FROM books").is_ok());
        assert!(verify_select_only("  select * from books").is_ok());
        assert!(verify_select_only("SELECT 1;").is_ok());
        assert!(verify_select_only("DELETE FROM books").is_err());
        assert!(verify_select_only("SELECT 1; SELECT 2").is_err());
        assert!(verify_select_only("SELECT * FROM books WHERE x IN (UPDATE t SET a=1)").is_err());
    }

    #[test]
    fn test_contains_whole_word() {
        assert!(contains_whole_word("DROP TABLE", "DROP"));
        assert!(!contains_whole_word("CREATED_AT", "CREATE"));
        assert!(!contains_whole_word("UPDATE_COUNT", "UPDATE"));
        assert!(contains_whole_word("X,DELETE", "DELETE"));
        assert!(!contains_whole_word("DEL", "DELETE"));
    }
}
