use crate::application::use_cases::pattern_tables::PatternTables;
use crate::domain::query::{Intent, Language};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// Number of patterns of the winning intent that matched.
    pub matches: usize,
    pub confidence: f64,
}

/// Confidence of the classification step alone: `min(0.9, 0.4 + 0.2 * matches)`.
pub fn base_intent_confidence(matches: usize) -> f64 {
    (0.4 + 0.2 * matches as f64).min(0.9)
}

/// Scores every registered intent by counting matching patterns.
pub struct IntentClassifier {
    tables: Arc<PatternTables>,
}

impl IntentClassifier {
    pub fn new(tables: Arc<PatternTables>) -> Self {
        Self { tables }
    }

    /// Highest match count wins. A later intent must beat the current best
    /// strictly, so ties go to the intent registered first. No match at all
    /// yields `Intent::Unknown`.
    pub fn classify(&self, text: &str, language: Language) -> Classification {
        let lowered = text.to_lowercase();
        let mut best = Intent::Unknown;
        let mut best_matches = 0usize;

        for (intent, patterns) in &self.tables.intents {
            let matches = patterns
                .for_language(language)
                .iter()
                .filter(|p| p.is_match(&lowered))
                .count();
            if matches > best_matches {
                best = *intent;
                best_matches = matches;
            }
        }

        let confidence = base_intent_confidence(best_matches);
        debug!(
            "Classified {:?} as {} ({} matches, confidence {:.2})",
            text, best, best_matches, confidence
        );

        Classification {
            intent: best,
            matches: best_matches,
            confidence,
        }
    }
}
