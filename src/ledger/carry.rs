use crate::decimal::Money;
use crate::types::SchoolYear;

/// one school year of a student's ledger before carried credits are settled
#[derive(Debug, Clone, PartialEq)]
pub struct YearPosition {
    pub school_year: SchoolYear,
    /// balance from the year's own fees, grants and own-year payments
    pub own_balance: Money,
    /// credit the year's payments carried back to earlier years
    pub carried_back: Money,
}

/// settles carried-back credit against earlier years
pub struct CarryBack;

impl CarryBack {
    /// credit landing on each position, in the same order
    ///
    /// `positions` must be sorted by school year. Each year's credit pays the
    /// earliest open years first. Credit no earlier year can absorb falls
    /// back to the year that carried it.
    pub fn settle(positions: &[YearPosition]) -> Vec<Money> {
        let mut remaining: Vec<Money> = positions.iter().map(|p| p.own_balance).collect();
        let mut carried_in = vec![Money::ZERO; positions.len()];

        for (later, position) in positions.iter().enumerate() {
            let mut credit = position.carried_back;

            for earlier in 0..later {
                if !credit.is_positive() {
                    break;
                }
                let take = remaining[earlier].min(credit);
                remaining[earlier] -= take;
                carried_in[earlier] += take;
                credit -= take;
            }

            if credit.is_positive() {
                carried_in[later] += credit;
                remaining[later] = (remaining[later] - credit).non_negative();
            }
        }

        carried_in
    }
}
