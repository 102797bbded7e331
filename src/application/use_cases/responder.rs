//! One-sentence natural-language summaries of a query result.

use crate::domain::query::{EntityBag, EntityType, Intent, Language};
use crate::domain::response::FormattedRecord;

/// Results at or below this count are quoted in the sentence.
const MAX_QUOTED_EXAMPLES: usize = 3;

fn count_sentence(intent: Intent, count: usize, language: Language) -> String {
    match language {
        Language::Zh => match intent {
            Intent::QueryBookInventory => format!("找到 {} 本图书的库存信息", count),
            Intent::QueryBookByTitle => format!("找到 {} 本相关图书", count),
            Intent::QueryBookByAuthor => format!("找到该作者的 {} 本作品", count),
            Intent::QueryBookByCategory => format!("该类别下有 {} 本图书", count),
            Intent::QueryBorrowingRecords => format!("找到 {} 条借阅记录", count),
            Intent::QueryStudentBorrowing => format!("该学生有 {} 条借阅记录", count),
            Intent::QueryStatistics => format!("统计结果显示 {} 条热门图书信息", count),
            Intent::QueryOverdueBooks => format!("发现 {} 本逾期图书", count),
            Intent::Unknown => format!("查询完成，找到 {} 条结果", count),
        },
        Language::En => match intent {
            Intent::QueryBookInventory => format!("Found inventory for {} book copies", count),
            Intent::QueryBookByTitle => format!("Found {} matching books", count),
            Intent::QueryBookByAuthor => format!("Found {} works by this author", count),
            Intent::QueryBookByCategory => format!("This category has {} books", count),
            Intent::QueryBorrowingRecords => format!("Found {} borrowing records", count),
            Intent::QueryStudentBorrowing => format!("This student has {} borrowing records", count),
            Intent::QueryStatistics => format!("Statistics show {} popular books", count),
            Intent::QueryOverdueBooks => format!("Found {} overdue books", count),
            Intent::Unknown => format!("Query finished with {} results", count),
        },
    }
}

fn no_results_sentence(intent: Intent, entities: &EntityBag, language: Language) -> String {
    let searched = match intent {
        Intent::QueryBookByTitle => entities.get(EntityType::BookTitle),
        Intent::QueryBookByAuthor => entities.get(EntityType::AuthorName),
        Intent::QueryBookByCategory => entities.get(EntityType::CategoryName),
        Intent::QueryStudentBorrowing => entities.get(EntityType::StudentId),
        _ => None,
    };

    match (language, intent, searched) {
        (Language::Zh, Intent::QueryBookByTitle, Some(v)) => format!("未找到书名包含 '{}' 的图书", v),
        (Language::Zh, Intent::QueryBookByAuthor, Some(v)) => format!("未找到作者 '{}' 的作品", v),
        (Language::Zh, Intent::QueryBookByCategory, Some(v)) => format!("该类别 '{}' 下暂无图书", v),
        (Language::Zh, Intent::QueryStudentBorrowing, Some(v)) => format!("学生 '{}' 暂无借阅记录", v),
        (Language::Zh, Intent::QueryOverdueBooks, _) => "当前没有逾期图书".to_string(),
        (Language::Zh, _, _) => "未找到相关信息".to_string(),
        (Language::En, Intent::QueryBookByTitle, Some(v)) => {
            format!("No books found with a title containing '{}'", v)
        }
        (Language::En, Intent::QueryBookByAuthor, Some(v)) => format!("No works found by '{}'", v),
        (Language::En, Intent::QueryBookByCategory, Some(v)) => {
            format!("No books in the '{}' category yet", v)
        }
        (Language::En, Intent::QueryStudentBorrowing, Some(v)) => {
            format!("Student '{}' has no borrowing records", v)
        }
        (Language::En, Intent::QueryOverdueBooks, _) => "There are no overdue books".to_string(),
        (Language::En, _, _) => "No matching information found".to_string(),
    }
}

/// Zero-result sentence. Always names at least one supplied entity value
/// when there is one.
pub fn no_results_response(intent: Intent, entities: &EntityBag, language: Language) -> String {
    let sentence = no_results_sentence(intent, entities, language);
    if entities.is_empty() || entities.iter().any(|(_, v)| sentence.contains(v)) {
        return sentence;
    }

    let searched: Vec<&str> = entities.iter().map(|(_, v)| v).collect();
    match language {
        Language::Zh => format!("{}（查询条件：{}）", sentence, searched.join("、")),
        Language::En => format!("{} (searched for: {})", sentence, searched.join(", ")),
    }
}

/// Count sentence, with up to three examples quoted for small result sets.
pub fn natural_response(
    intent: Intent,
    results: &[FormattedRecord],
    entities: &EntityBag,
    language: Language,
) -> String {
    if results.is_empty() {
        return no_results_response(intent, entities, language);
    }

    let mut sentence = count_sentence(intent, results.len(), language);
    if results.len() <= MAX_QUOTED_EXAMPLES {
        let examples: Vec<&str> = results
            .iter()
            .take(MAX_QUOTED_EXAMPLES)
            .map(|r| r.display_text.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        if !examples.is_empty() {
            match language {
                Language::Zh => {
                    sentence.push('：');
                    sentence.push_str(&examples.join("；"));
                }
                Language::En => {
                    sentence.push_str(": ");
                    sentence.push_str(&examples.join("; "));
                }
            }
        }
    }
    sentence
}
