//! Pattern tables for the rule-based understander.
//!
//! Built once at startup and shared read-only (`Arc<PatternTables>`) by the
//! classifier and the extractor. List order is significant everywhere:
//! intents are scored in registration order (ties go to the earlier one) and
//! entity patterns are tried in order until one yields a value.
//!
//! Intent patterns run against lowercased text. Entity patterns run against
//! the original text and carry their own `(?i)` flag where case must not
//! matter; English author names rely on capitalization and stay case-sensitive.

use crate::domain::error::{AppError, Result};
use crate::domain::query::{EntityType, Intent, Language, TimeRange};
use regex::Regex;
use std::collections::HashMap;

/// Ordered patterns for each supported language.
pub struct LanguagePatterns {
    zh: Vec<Regex>,
    en: Vec<Regex>,
}

impl LanguagePatterns {
    pub fn compile(zh: &[&str], en: &[&str]) -> Result<Self> {
        Ok(Self {
            zh: compile_all(zh)?,
            en: compile_all(en)?,
        })
    }

    pub fn for_language(&self, language: Language) -> &[Regex] {
        match language {
            Language::Zh => &self.zh,
            Language::En => &self.en,
        }
    }
}

/// A keyword pattern mapped to a canonical value.
pub struct KeywordRule {
    pub pattern: Regex,
    pub value: &'static str,
}

pub struct PatternTables {
    pub intents: Vec<(Intent, LanguagePatterns)>,
    pub entities: Vec<(EntityType, LanguagePatterns)>,
    pub time_ranges: Vec<(TimeRange, Vec<Regex>)>,
    pub statuses: Vec<KeywordRule>,
    pub conditions: Vec<KeywordRule>,
    category_synonyms: HashMap<&'static str, &'static str>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| AppError::Internal(format!("Invalid pattern '{}': {}", pattern, e)))
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn keyword_rules(rules: &[(&str, &'static str)]) -> Result<Vec<KeywordRule>> {
    rules
        .iter()
        .map(|&(pattern, value)| {
            Ok(KeywordRule {
                pattern: compile(pattern)?,
                value,
            })
        })
        .collect()
}

impl PatternTables {
    /// Compile the built-in library tables.
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            intents: builtin_intents()?,
            entities: builtin_entities()?,
            time_ranges: builtin_time_ranges()?,
            statuses: keyword_rules(&[
                (r"已归还|还回|\breturned\b", "returned"),
                (r"逾期|超期|\boverdue\b", "overdue"),
                (r"遗失|丢失|\bmissing\b|\blost\b", "missing"),
                (r"已借出|借出|\bchecked out\b|\bon loan\b", "borrowed"),
                (r"可借|在架|可用|\bavailable\b", "available"),
            ])?,
            conditions: keyword_rules(&[
                (r"完好|良好|\bgood condition\b", "good"),
                (r"品相一般|状况一般|\bfair condition\b", "fair"),
                (r"破损|较差|\bpoor condition\b|\bdamaged\b", "poor"),
            ])?,
            category_synonyms: builtin_category_synonyms(),
        })
    }

    pub fn intent_patterns(&self, intent: Intent, language: Language) -> &[Regex] {
        self.intents
            .iter()
            .find(|(i, _)| *i == intent)
            .map(|(_, p)| p.for_language(language))
            .unwrap_or(&[])
    }

    /// Canonical category for a raw value; unknown values pass through.
    pub fn canonical_category(&self, raw: &str) -> String {
        let key = raw.trim().to_lowercase();
        self.category_synonyms
            .get(key.as_str())
            .map(|v| v.to_string())
            .unwrap_or_else(|| raw.trim().to_string())
    }
}

fn builtin_intents() -> Result<Vec<(Intent, LanguagePatterns)>> {
    Ok(vec![
        (
            Intent::QueryBookInventory,
            LanguagePatterns::compile(
                &[
                    r"(查询|查看|看看).*?库存",
                    r"库存.*?(查询|情况)",
                    r"有多少.*?书",
                    r"书.*?(数量|库存)",
                ],
                &[
                    r"(stock|inventory|available).*?books?",
                    r"books?.*?(stock|inventory)",
                    r"how many.*?books?",
                    r"book.*?(count|quantity)",
                ],
            )?,
        ),
        (
            Intent::QueryBookByTitle,
            LanguagePatterns::compile(
                &[
                    r"(查找|查询|搜索).*?《(.+?)》",
                    r"《(.+?)》.*?(查找|查询)",
                    r"(找|要|需要).*?书.*?叫.*?《(.+?)》",
                    r"书名.*?(是|叫).*?《(.+?)》",
                ],
                &[
                    r#"find.*?book.*?['"](.+?)['"]"#,
                    r#"['"](.+?)['"].*?book"#,
                    r#"search.*?for.*?['"](.+?)['"]"#,
                    r#"book.*?titled.*?['"](.+?)['"]"#,
                ],
            )?,
        ),
        (
            Intent::QueryBookByAuthor,
            LanguagePatterns::compile(
                &[
                    r"([^，。！？\s]+)(写的|著的|创作的).*?书",
                    r"(.+?)作者.*?书",
                    r"作者.*?(是|为).*?([^，。！？\s]+).*?书",
                    r"([^，。！？\s]+).*?的作品",
                ],
                &[
                    r"books?\s+by\s+([^,\.!?]+)",
                    r"([^,\.!?]+)'?s?\s+books?",
                    r"author.*?([^,\.!?]+).*?books?",
                    r"works?\s+by\s+([^,\.!?]+)",
                ],
            )?,
        ),
        (
            Intent::QueryBookByCategory,
            LanguagePatterns::compile(
                &[
                    r"([^，。！？\s]+)类.*?图书",
                    r"图书.*?([^，。！？\s]+)类",
                    r"([^，。！？\s]+).*?书籍",
                    r"类别.*?(是|为).*?([^，。！？\s]+)",
                ],
                &[
                    r"([a-z\s]+)\s+(books?|literature)",
                    r"(fiction|non-fiction|science|history|biography).*?books?",
                    r"books?.*?(fiction|non-fiction|science|history|biography)",
                    r"category.*?([a-z\s]+)",
                ],
            )?,
        ),
        (
            Intent::QueryBorrowingRecords,
            LanguagePatterns::compile(
                &[
                    r"(查询|查看|统计).*?借阅.*?记录",
                    r"借阅.*?记录.*?(查询|查看)",
                    r"借书.*?(历史|记录|情况)",
                    r"(过去|最近|本月|上月).*?借阅",
                ],
                &[
                    r"(borrowing|lending).*?records?",
                    r"records?.*?(borrowing|lending)",
                    r"borrow.*?(history|records?)",
                    r"(recent|past|this|last).*?(month|week).*?borrowing",
                ],
            )?,
        ),
        (
            Intent::QueryStudentBorrowing,
            LanguagePatterns::compile(
                &[
                    r"(学号|学生(?:id)?|姓名)\s*[为是]?\s*([a-z0-9\x{4e00}-\x{9fa5}]+).*?借阅",
                    r"学生.*?([a-z0-9\x{4e00}-\x{9fa5}]+).*?借阅",
                    r"([0-9]+).*?学生.*?借书",
                ],
                &[
                    r"student\s+([a-z0-9]+).*?borrowing",
                    r"borrowing.*?student\s+([a-z0-9]+)",
                    r"([0-9]+).*?student.*?books?",
                ],
            )?,
        ),
        (
            Intent::QueryStatistics,
            LanguagePatterns::compile(
                &[
                    r"(统计|报表|分析).*?(热门|流行|受欢迎)",
                    r"热门.*?图书",
                    r"(数据|报告|趋势).*?(分析|统计)",
                    r"(最多|最受欢迎).*?书",
                ],
                &[
                    r"(statistics?|reports?|analytics?).*?(popular|trending)",
                    r"popular.*?books?",
                    r"(most|top).*?(borrowed|popular)",
                    r"trending.*?(books?|titles?)",
                ],
            )?,
        ),
        (
            Intent::QueryOverdueBooks,
            LanguagePatterns::compile(
                &[
                    r"(查询|查看).*?逾期.*?图书",
                    r"逾期.*?图书.*?(查询|查看)",
                    r"(超期|过期).*?书",
                    r"未归还.*?书",
                    r"逾期.*?书",
                ],
                &[
                    r"overdue.*?books?",
                    r"books?.*?overdue",
                    r"(late|expired).*?returns?",
                    r"unreturned.*?books?",
                ],
            )?,
        ),
    ])
}

/// Capture group 1 of every entity pattern holds the value.
fn builtin_entities() -> Result<Vec<(EntityType, LanguagePatterns)>> {
    const EN_MONTHS: &str =
        "January|February|March|April|May|June|July|August|September|October|November|December";
    let en_long_date = format!(r"(?i)(\d{{1,2}}\s+(?:{})\s+\d{{4}})", EN_MONTHS);

    Ok(vec![
        (
            EntityType::BookTitle,
            LanguagePatterns::compile(
                &[
                    r"《(.+?)》",
                    r"书名.*?(?:是|叫|为)\s*[“「]?([^，。！？”」\s]+)",
                    r"(?:找|要|查).*?[「『](.+?)[」』]",
                ],
                &[
                    r#"["“](.+?)["”]"#,
                    r"(?i)\bbook.*?'(.+?)'",
                    r#"(?i)\btitled\s+['"“]?([^'"”]+?)['"”]?\s*$"#,
                ],
            )?,
        ),
        (
            EntityType::AuthorName,
            LanguagePatterns::compile(
                &[
                    r"([^，。！？\s]+)(?:写的|著的|创作的)",
                    r"作者.*?(?:是|为)\s*([^，。！？\s的]+)",
                    r"([^，。！？\s]+?)的作品",
                ],
                &[
                    r"\b(?i:by)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
                    r"\b(?i:author)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
                    r"([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)'?s?\s+(?i:books?)",
                ],
            )?,
        ),
        (
            EntityType::CategoryName,
            LanguagePatterns::compile(
                &[
                    r"([^，。！？\s]+)类.*?(?:图书|书)",
                    r"([^，。！？\s]+)(?:类别|类)的?书籍",
                    r"类别.*?(?:是|为)\s*([^，。！？\s]+)",
                    r"(科幻|文学|历史|计算机|小说|传记|哲学|艺术|医学|工程)",
                ],
                &[
                    r"(?i)\b(science fiction|sci-fi|non-fiction|fiction|computer science|science|history|biography|literature|mystery|romance|fantasy|horror|philosophy|medicine|engineering)\b",
                    r"(?i)\bcategory\s+(?:is\s+|of\s+)?([a-z]+(?:\s+[a-z]+)?)",
                ],
            )?,
        ),
        (
            EntityType::StudentId,
            LanguagePatterns::compile(
                &[
                    r"(?i)学号.*?([A-Z0-9]+)",
                    r"(?i)学生.*?([A-Z0-9]+)",
                    r"(?i)([A-Z]\d{7}[A-Z])",
                    r"学生\s*([\x{4e00}-\x{9fa5}]{2,4}?)(?:的|借)",
                ],
                &[
                    r"(?i)\bstudent\s+([A-Z0-9]+)",
                    r"(?i)\bID\s+([A-Z0-9]+)",
                    r"(?i)\b([A-Z]\d{7}[A-Z])\b",
                ],
            )?,
        ),
        (
            EntityType::Date,
            LanguagePatterns::compile(
                &[
                    r"(\d{4}年\d{1,2}月\d{1,2}日)",
                    r"(\d{4}-\d{1,2}-\d{1,2})",
                    r"(\d{1,2}/\d{1,2}/\d{4})",
                ],
                &[
                    r"(\d{4}-\d{1,2}-\d{1,2})",
                    r"(\d{1,2}/\d{1,2}/\d{4})",
                    en_long_date.as_str(),
                ],
            )?,
        ),
    ])
}

fn builtin_time_ranges() -> Result<Vec<(TimeRange, Vec<Regex>)>> {
    Ok(vec![
        (
            TimeRange::ThisMonth,
            compile_all(&["本月", "这个月", "当月", "this month", "current month"])?,
        ),
        (
            TimeRange::LastMonth,
            compile_all(&["上月", "上个月", "前月", "last month", "previous month"])?,
        ),
        (
            TimeRange::ThisYear,
            compile_all(&["今年", "本年", "这一年", "this year", "current year"])?,
        ),
        (
            TimeRange::LastYear,
            compile_all(&["去年", "上年", "last year", "previous year"])?,
        ),
        (
            TimeRange::Last7Days,
            compile_all(&[
                "最近(7|七)天",
                "过去(7|七)天",
                "近一周",
                "last 7 days",
                "past 7 days",
                "last week",
            ])?,
        ),
        (
            TimeRange::Last30Days,
            compile_all(&[
                "最近(30|三十)天",
                "过去(30|三十)天",
                "近一个月",
                "last 30 days",
                "past 30 days",
            ])?,
        ),
    ])
}

fn builtin_category_synonyms() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("科幻", "Science Fiction"),
        ("文学", "Literature"),
        ("历史", "History"),
        ("计算机", "Computer Science"),
        ("小说", "Fiction"),
        ("传记", "Biography"),
        ("哲学", "Philosophy"),
        ("艺术", "Art"),
        ("医学", "Medicine"),
        ("工程", "Engineering"),
        ("科学", "Science"),
        ("sci-fi", "Science Fiction"),
        ("science fiction", "Science Fiction"),
        ("biography", "Biography"),
        ("computer", "Computer Science"),
        ("computer science", "Computer Science"),
    ])
}
