use crate::domain::query::{EntityBag, EntityType, Intent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityValidation {
    pub valid: bool,
    pub missing: Vec<EntityType>,
}

/// Check that every entity `intent` requires is present and non-empty.
pub fn validate_entities(intent: Intent, entities: &EntityBag) -> EntityValidation {
    let missing: Vec<EntityType> = intent
        .required_entities()
        .iter()
        .copied()
        .filter(|t| !entities.contains(*t))
        .collect();

    EntityValidation {
        valid: missing.is_empty(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_iff_required_present() {
        for intent in Intent::ALL {
            let mut bag = EntityBag::new();
            let required = intent.required_entities();
            let result = validate_entities(intent, &bag);
            assert_eq!(result.valid, required.is_empty());
            assert_eq!(result.missing, required.to_vec());

            for t in required {
                bag.insert(*t, "value");
            }
            assert!(validate_entities(intent, &bag).valid);
        }
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let bag = EntityBag::new().with(EntityType::StudentId, "  《》 ");
        let result = validate_entities(Intent::QueryStudentBorrowing, &bag);
        assert!(!result.valid);
        assert_eq!(result.missing, vec![EntityType::StudentId]);
    }

    #[test]
    fn test_extra_entities_do_not_matter() {
        let bag = EntityBag::new()
            .with(EntityType::AuthorName, "Liu Cixin")
            .with(EntityType::TimeRange, "this_year");
        assert!(validate_entities(Intent::QueryBookByAuthor, &bag).valid);
        assert!(!validate_entities(Intent::QueryBookByTitle, &bag).valid);
    }
}
