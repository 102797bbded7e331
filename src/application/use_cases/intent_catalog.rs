//! Descriptions and sample questions for every supported intent.
//!
//! Used to build LLM prompts and served to clients listing what can be asked.

use crate::domain::query::{EntityType, Intent};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct IntentInfo {
    pub intent: Intent,
    pub description_zh: &'static str,
    pub description_en: &'static str,
    pub examples: &'static [&'static str],
    /// Entity types worth extracting for this intent.
    pub entities: &'static [EntityType],
}

pub const INTENT_CATALOG: &[IntentInfo] = &[
    IntentInfo {
        intent: Intent::QueryBookInventory,
        description_zh: "查询图书库存和副本状态",
        description_en: "Check stock and copy status of books",
        examples: &["图书库存情况", "哪些书可以借阅？", "available books in good condition"],
        entities: &[EntityType::BookTitle, EntityType::Status, EntityType::Condition],
    },
    IntentInfo {
        intent: Intent::QueryBookByTitle,
        description_zh: "根据书名查询图书信息",
        description_en: "Look up a book by its title",
        examples: &["查找《三体》", "有《1984》这本书吗？", "find the book titled 1984"],
        entities: &[EntityType::BookTitle, EntityType::Status, EntityType::Condition],
    },
    IntentInfo {
        intent: Intent::QueryBookByAuthor,
        description_zh: "查询某个作者的作品",
        description_en: "List the works of an author",
        examples: &["鲁迅的作品有哪些？", "查找金庸写的书", "Books by Liu Cixin"],
        entities: &[EntityType::AuthorName, EntityType::CategoryName],
    },
    IntentInfo {
        intent: Intent::QueryBookByCategory,
        description_zh: "查询某个类别的图书",
        description_en: "List books in a category",
        examples: &["计算机类别的书籍", "科幻类图书", "science fiction books"],
        entities: &[EntityType::CategoryName, EntityType::AuthorName],
    },
    IntentInfo {
        intent: Intent::QueryBorrowingRecords,
        description_zh: "查询借阅记录",
        description_en: "Show borrowing records",
        examples: &["本月借阅情况", "最近的借阅记录", "borrowing records last month"],
        entities: &[
            EntityType::StudentId,
            EntityType::BookTitle,
            EntityType::TimeRange,
            EntityType::Date,
            EntityType::Status,
        ],
    },
    IntentInfo {
        intent: Intent::QueryStudentBorrowing,
        description_zh: "查询特定学生的借阅情况",
        description_en: "Show what a specific student has borrowed",
        examples: &["学号A1234567B的借阅记录", "学生张三的借阅情况", "what has student B7654321C borrowed"],
        entities: &[EntityType::StudentId, EntityType::TimeRange, EntityType::Status],
    },
    IntentInfo {
        intent: Intent::QueryStatistics,
        description_zh: "查询借阅统计和热门图书",
        description_en: "Borrowing statistics and popular books",
        examples: &["统计热门图书", "借阅量最高的图书", "most popular books this year"],
        entities: &[EntityType::TimeRange, EntityType::CategoryName],
    },
    IntentInfo {
        intent: Intent::QueryOverdueBooks,
        description_zh: "查询逾期未还的图书",
        description_en: "List overdue loans",
        examples: &["有哪些逾期的书？", "逾期图书列表", "show overdue books"],
        entities: &[EntityType::TimeRange],
    },
];

pub fn intent_info(intent: Intent) -> Option<&'static IntentInfo> {
    INTENT_CATALOG.iter().find(|info| info.intent == intent)
}

pub fn entity_description(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::BookTitle => "book title, without quotation marks or 《》",
        EntityType::AuthorName => "author name",
        EntityType::CategoryName => "book category or subject",
        EntityType::StudentId => "student matriculation number or student name",
        EntityType::Status => "one of available, borrowed, missing, returned, overdue",
        EntityType::Condition => "one of good, fair, poor",
        EntityType::TimeRange => {
            "one of this_month, last_month, this_year, last_year, last_7_days, last_30_days"
        }
        EntityType::Date => "a specific date in YYYY-MM-DD format",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_intent_is_catalogued_once() {
        for intent in Intent::ALL {
            assert_eq!(
                INTENT_CATALOG.iter().filter(|i| i.intent == intent).count(),
                1,
                "{}",
                intent
            );
        }
        assert!(intent_info(Intent::Unknown).is_none());
    }

    #[test]
    fn test_required_entities_are_extractable() {
        for info in INTENT_CATALOG {
            for required in info.intent.required_entities() {
                assert!(info.entities.contains(required), "{}", info.intent);
            }
        }
    }
}
