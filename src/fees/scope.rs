use crate::fees::{FeeItem, ScopeFilters, StudentScope};
use crate::types::AssignmentScope;

/// decides whether a fee item is billed to a student
///
/// A `Specific` item matches only when every non-null filter equals the
/// student's value. Filters are AND-ed; one mismatch excludes the item.
pub struct ScopeMatcher;

impl ScopeMatcher {
    pub fn matches(item: &FeeItem, student: &StudentScope) -> bool {
        match item.assignment_scope {
            AssignmentScope::All => true,
            AssignmentScope::Specific => Self::filters_match(&item.filters, student),
        }
    }

    pub fn filters_match(filters: &ScopeFilters, student: &StudentScope) -> bool {
        field_matches(&filters.classification, &student.classification)
            && field_matches(&filters.department_id, &student.department_id)
            && field_matches(&filters.program_id, &student.program_id)
            && field_matches(&filters.year_level_id, &student.year_level_id)
            && field_matches(&filters.section_id, &student.section_id)
    }
}

// a set filter never matches a student who lacks the attribute
fn field_matches<T: PartialEq>(filter: &Option<T>, value: &Option<T>) -> bool {
    match filter {
        None => true,
        Some(expected) => value.as_ref() == Some(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::types::{Classification, SchoolYear};
    use uuid::Uuid;

    fn college_student() -> StudentScope {
        StudentScope {
            student_id: Uuid::new_v4(),
            classification: Some(Classification::new("college")),
            department_id: Some(Uuid::new_v4()),
            program_id: Some(Uuid::new_v4()),
            year_level_id: Some(Uuid::new_v4()),
            section_id: Some(Uuid::new_v4()),
        }
    }

    fn item(filters: ScopeFilters) -> FeeItem {
        FeeItem::scoped("Lab fee", SchoolYear::new(2024), Money::from_major(500), filters)
    }

    #[test]
    fn test_wildcard_item_matches_everyone() {
        let wildcard = item(ScopeFilters::default());
        assert!(wildcard.filters.is_wildcard());

        let bare = StudentScope {
            student_id: Uuid::new_v4(),
            classification: None,
            department_id: None,
            program_id: None,
            year_level_id: None,
            section_id: None,
        };

        assert!(ScopeMatcher::matches(&wildcard, &college_student()));
        assert!(ScopeMatcher::matches(&wildcard, &bare));
    }

    #[test]
    fn test_all_scope_ignores_filters() {
        let student = college_student();
        let mut all = item(ScopeFilters {
            department_id: Some(Uuid::new_v4()),
            ..ScopeFilters::default()
        });
        all.assignment_scope = AssignmentScope::All;

        assert!(ScopeMatcher::matches(&all, &student));
    }

    #[test]
    fn test_every_set_filter_must_match() {
        let student = college_student();

        let exact = item(ScopeFilters {
            classification: student.classification.clone(),
            department_id: student.department_id,
            program_id: student.program_id,
            year_level_id: student.year_level_id,
            section_id: student.section_id,
        });
        assert!(ScopeMatcher::matches(&exact, &student));

        // same department, different section
        let wrong_section = item(ScopeFilters {
            department_id: student.department_id,
            section_id: Some(Uuid::new_v4()),
            ..ScopeFilters::default()
        });
        assert!(!ScopeMatcher::matches(&wrong_section, &student));

        let wrong_classification = item(ScopeFilters {
            classification: Some(Classification::new("senior_high")),
            ..ScopeFilters::default()
        });
        assert!(!ScopeMatcher::matches(&wrong_classification, &student));
    }

    #[test]
    fn test_set_filter_excludes_student_without_attribute() {
        let mut student = college_student();
        student.program_id = None;

        let program_only = item(ScopeFilters {
            program_id: Some(Uuid::new_v4()),
            ..ScopeFilters::default()
        });
        assert!(!ScopeMatcher::matches(&program_only, &student));
    }
}
