use std::collections::HashMap;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::grants::{Grant, GrantAssignment};
use crate::types::{GrantId, GrantType};

/// computes grant discounts
pub struct GrantCalculator;

impl GrantCalculator {
    /// discount one grant gives against `base`
    ///
    /// Fixed grants never exceed the base. Percentage grants are not clamped here.
    pub fn discount_for(grant: &Grant, base: Money) -> Money {
        match grant.grant_type {
            GrantType::Fixed => Money::from_decimal(grant.value).min(base.non_negative()),
            GrantType::Percentage => base.percentage(grant.value),
        }
    }

    /// sum of cached discounts over active assignments
    pub fn total_discount(assignments: &[GrantAssignment]) -> Money {
        assignments
            .iter()
            .filter(|a| a.status.is_active())
            .map(|a| a.discount_amount)
            .sum()
    }

    /// refresh every assignment's cached discount against `base`
    ///
    /// Inactive rows are refreshed too so the cache stays meaningful if they
    /// are reactivated.
    pub fn recompute(
        assignments: &mut [GrantAssignment],
        grants: &HashMap<GrantId, Grant>,
        base: Money,
    ) -> Result<Money> {
        for assignment in assignments.iter_mut() {
            let grant = grants
                .get(&assignment.grant_id)
                .ok_or(LedgerError::GrantNotFound {
                    id: assignment.grant_id,
                })?;
            assignment.discount_amount = Self::discount_for(grant, base);
        }
        Ok(Self::total_discount(assignments))
    }
}
