use crate::domain::query::Intent;

pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.95;

// Heuristic, tunable.
const BASE: f64 = 0.5;
const INTENT_BONUS: f64 = 0.2;
const PER_ENTITY_BONUS: f64 = 0.05;
const MAX_ENTITY_BONUS: f64 = 0.2;

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_CONFIDENCE;
    }
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// `min(1.2, len / 10)` for inputs longer than 5 characters, else 1.
pub fn length_factor(text: &str) -> f64 {
    let len = text.trim().chars().count();
    if len > 5 {
        (len as f64 / 10.0).min(1.2)
    } else {
        1.0
    }
}

/// `clamp(0.5 + 0.2·[intent≠unknown] + min(0.2, 0.05·entities)·length_factor, 0.1, 0.95)`
///
/// The length factor scales the entity bonus only.
pub fn aggregate_confidence(intent: Intent, entity_count: usize, text: &str) -> f64 {
    let intent_bonus = if intent != Intent::Unknown { INTENT_BONUS } else { 0.0 };
    let entity_bonus = (PER_ENTITY_BONUS * entity_count as f64).min(MAX_ENTITY_BONUS);
    clamp_confidence(BASE + intent_bonus + entity_bonus * length_factor(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_lookup_score() {
        // 6 characters: factor 0.6, one entity
        let c = aggregate_confidence(Intent::QueryBookByTitle, 1, "查找《三体》");
        assert!((c - 0.73).abs() < 1e-9, "{}", c);
    }

    #[test]
    fn test_short_text_keeps_unit_factor() {
        assert!((length_factor("三体") - 1.0).abs() < 1e-9);
        assert!((length_factor("   abcde   ") - 1.0).abs() < 1e-9);
        assert!((length_factor("a very long question indeed") - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_intent_without_entities() {
        let c = aggregate_confidence(Intent::Unknown, 0, "hello");
        assert!((c - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_entity_bonus_saturates() {
        let text = "statistics of popular books this year";
        let c = aggregate_confidence(Intent::QueryStatistics, 10, text);
        assert!((c - 0.94).abs() < 1e-9, "{}", c);
        assert_eq!(c, aggregate_confidence(Intent::QueryStatistics, 4, text));
    }

    #[test]
    fn test_always_within_bounds() {
        let texts = ["", "x", "查找《三体》", "a fairly long english sentence about books"];
        for intent in Intent::ALL.iter().copied().chain([Intent::Unknown]) {
            for count in 0..12 {
                for text in texts {
                    let c = aggregate_confidence(intent, count, text);
                    assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c));
                }
            }
        }
        assert_eq!(clamp_confidence(f64::NAN), MIN_CONFIDENCE);
        assert_eq!(clamp_confidence(-3.0), MIN_CONFIDENCE);
    }
}
