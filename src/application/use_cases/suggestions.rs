//! Canned follow-ups and clarifying questions.

use crate::domain::query::{EntityType, Intent, Language};

/// Result counts above this get a "narrow it down" hint.
pub const NARROWING_THRESHOLD: usize = 10;

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Human name of an entity type.
pub fn entity_label(entity_type: EntityType, language: Language) -> &'static str {
    match (language, entity_type) {
        (Language::Zh, EntityType::BookTitle) => "书名",
        (Language::Zh, EntityType::AuthorName) => "作者姓名",
        (Language::Zh, EntityType::CategoryName) => "图书类别",
        (Language::Zh, EntityType::StudentId) => "学生学号或姓名",
        (Language::Zh, EntityType::Status) => "状态",
        (Language::Zh, EntityType::Condition) => "品相",
        (Language::Zh, EntityType::TimeRange) => "时间范围",
        (Language::Zh, EntityType::Date) => "日期",
        (Language::En, EntityType::BookTitle) => "book title",
        (Language::En, EntityType::AuthorName) => "author name",
        (Language::En, EntityType::CategoryName) => "book category",
        (Language::En, EntityType::StudentId) => "student ID or name",
        (Language::En, EntityType::Status) => "status",
        (Language::En, EntityType::Condition) => "condition",
        (Language::En, EntityType::TimeRange) => "time range",
        (Language::En, EntityType::Date) => "date",
    }
}

/// One question per missing entity, in the order given.
pub fn clarifying_questions(missing: &[EntityType], language: Language) -> Vec<String> {
    missing
        .iter()
        .map(|entity_type| match (language, entity_type) {
            (Language::Zh, EntityType::BookTitle) => "您要查询哪本书？".to_string(),
            (Language::Zh, EntityType::AuthorName) => "请提供作者姓名".to_string(),
            (Language::Zh, EntityType::CategoryName) => "请指定图书类别".to_string(),
            (Language::Zh, EntityType::StudentId) => "请提供学生学号或姓名".to_string(),
            (Language::En, EntityType::BookTitle) => "Which book are you looking for?".to_string(),
            (Language::En, EntityType::AuthorName) => "Please provide the author's name".to_string(),
            (Language::En, EntityType::CategoryName) => "Please specify a book category".to_string(),
            (Language::En, EntityType::StudentId) => {
                "Please provide the student's ID or name".to_string()
            }
            (Language::Zh, other) => format!("请提供{}", entity_label(*other, language)),
            (Language::En, other) => format!("Please provide the {}", entity_label(*other, language)),
        })
        .collect()
}

/// Sentence asking for the missing entities.
pub fn missing_entities_message(missing: &[EntityType], language: Language) -> String {
    let names: Vec<&str> = missing.iter().map(|t| entity_label(*t, language)).collect();
    match language {
        Language::Zh => format!("请提供以下信息：{}", names.join("、")),
        Language::En => format!("Please provide the following: {}", names.join(", ")),
    }
}

/// Follow-ups after a successful query.
pub fn follow_up_suggestions(intent: Intent, result_count: usize, language: Language) -> Vec<String> {
    let mut suggestions = Vec::new();

    if result_count > NARROWING_THRESHOLD {
        suggestions.push(
            match language {
                Language::Zh => "结果较多，您可以添加更多筛选条件",
                Language::En => "Many results found; add more filters to narrow them down",
            }
            .to_string(),
        );
    }

    let related: &[&str] = match (language, intent) {
        (Language::Zh, i) if i.is_book_lookup() => &["您还可以查询该书的借阅情况", "查看相同类别的其他图书"],
        (Language::En, i) if i.is_book_lookup() => &[
            "You can also check how this book has been borrowed",
            "Browse other books in the same category",
        ],
        (Language::Zh, Intent::QueryStudentBorrowing) => &["查看学生的逾期图书", "查询学生借阅统计"],
        (Language::En, Intent::QueryStudentBorrowing) => &[
            "Check this student's overdue books",
            "See this student's borrowing statistics",
        ],
        (Language::Zh, Intent::QueryStatistics) => &["查看具体时间段的统计", "按类别查看统计信息"],
        (Language::En, Intent::QueryStatistics) => &[
            "Look at statistics for a specific period",
            "Break the statistics down by category",
        ],
        (Language::Zh, Intent::QueryOverdueBooks) => &["查看某位学生的借阅记录"],
        (Language::En, Intent::QueryOverdueBooks) => &["Look up a specific student's borrowing records"],
        _ => &[],
    };
    suggestions.extend(owned(related));
    suggestions
}

/// Example questions offered when nothing was understood.
pub fn unknown_intent_suggestions(language: Language) -> Vec<String> {
    match language {
        Language::Zh => owned(&[
            "尝试询问：查找某本书",
            "尝试询问：查看借阅记录",
            "尝试询问：统计信息",
            "使用更具体的关键词",
        ]),
        Language::En => owned(&[
            "Try asking: find a book by title",
            "Try asking: show borrowing records",
            "Try asking: library statistics",
            "Use more specific keywords",
        ]),
    }
}

pub fn generation_failure_suggestions(language: Language) -> Vec<String> {
    match language {
        Language::Zh => owned(&["检查输入格式", "使用更简单的表述"]),
        Language::En => owned(&["Check the wording of your question", "Try a simpler phrasing"]),
    }
}

/// Generic retry hints for execution failures and rejected queries.
pub fn retry_suggestions(language: Language) -> Vec<String> {
    match language {
        Language::Zh => owned(&["请尝试重新表述您的问题", "检查输入是否包含必要的信息"]),
        Language::En => owned(&[
            "Try rephrasing your question",
            "Check that your question includes the needed details",
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_results_suggest_narrowing() {
        let few = follow_up_suggestions(Intent::QueryBookByTitle, 3, Language::Zh);
        let many = follow_up_suggestions(Intent::QueryBookByTitle, 11, Language::Zh);
        assert_eq!(many.len(), few.len() + 1);
        assert_eq!(many[0], "结果较多，您可以添加更多筛选条件");
        assert!(follow_up_suggestions(Intent::QueryBookByTitle, 10, Language::En)
            .iter()
            .all(|s| !s.contains("narrow")));
    }

    #[test]
    fn test_book_intents_suggest_related_lookups() {
        for intent in [
            Intent::QueryBookInventory,
            Intent::QueryBookByTitle,
            Intent::QueryBookByAuthor,
            Intent::QueryBookByCategory,
        ] {
            assert_eq!(follow_up_suggestions(intent, 1, Language::En).len(), 2);
        }
        assert!(follow_up_suggestions(Intent::QueryBorrowingRecords, 1, Language::En).is_empty());
    }

    #[test]
    fn test_clarifying_question_for_student() {
        assert_eq!(
            clarifying_questions(&[EntityType::StudentId], Language::Zh),
            vec!["请提供学生学号或姓名".to_string()]
        );
        assert_eq!(
            missing_entities_message(&[EntityType::BookTitle, EntityType::AuthorName], Language::En),
            "Please provide the following: book title, author name"
        );
    }

    #[test]
    fn test_unknown_intent_suggestions_are_localized() {
        assert!(unknown_intent_suggestions(Language::Zh)[0].starts_with("尝试询问"));
        assert!(unknown_intent_suggestions(Language::En)[0].starts_with("Try asking"));
    }
}
