use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::fees::{FeeItem, ScopeMatcher, StudentScope};
use crate::types::SchoolYear;

/// fee items billed to one student for one school year
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeResolution {
    pub items: Vec<FeeItem>,
    /// sum of selling prices
    pub total: Money,
    /// sum of cost prices, for margin reporting
    pub cost_total: Money,
}

impl FeeResolution {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn margin(&self) -> Money {
        self.total - self.cost_total
    }
}

/// picks the applicable fee items out of a candidate list
pub struct FeeResolver;

impl FeeResolver {
    /// resolve fees for a student
    ///
    /// Without a school year nothing is billed and the resolution is empty.
    pub fn resolve(
        student: &StudentScope,
        school_year: Option<&SchoolYear>,
        candidates: &[FeeItem],
    ) -> FeeResolution {
        let Some(school_year) = school_year else {
            debug!(student_id = %student.student_id, "no school year given, nothing billed");
            return FeeResolution::default();
        };

        let items: Vec<FeeItem> = candidates
            .iter()
            .filter(|item| item.is_active && &item.school_year == school_year)
            .filter(|item| ScopeMatcher::matches(item, student))
            .cloned()
            .collect();

        let total = items.iter().map(|item| item.selling_price).sum();
        let cost_total = items.iter().map(|item| item.cost_price).sum();

        debug!(
            student_id = %student.student_id,
            school_year = %school_year,
            candidates = candidates.len(),
            applicable = items.len(),
            total = %total,
            "resolved fee items"
        );

        FeeResolution {
            items,
            total,
            cost_total,
        }
    }
}
