use crate::config::ZeroObligationStatus;
use crate::decimal::Money;
use crate::types::PaymentStatus;

/// figures a status decision is made from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusInputs {
    pub total_amount: Money,
    pub total_paid: Money,
    pub balance: Money,
    pub is_overdue: bool,
}

/// condition half of a status rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCondition {
    /// overdue flag set on the persisted record
    Flagged,
    /// nothing billed and nothing paid
    NothingBilled,
    /// something billed and nothing left to pay
    Settled,
    /// at least one payment recorded
    PartlyPaid,
    /// fallback
    Always,
}

impl StatusCondition {
    pub fn holds(&self, inputs: &StatusInputs) -> bool {
        match self {
            StatusCondition::Flagged => inputs.is_overdue,
            StatusCondition::NothingBilled => {
                inputs.total_amount.is_zero() && inputs.total_paid.is_zero()
            }
            StatusCondition::Settled => inputs.total_amount.is_positive() && !inputs.balance.is_positive(),
            StatusCondition::PartlyPaid => inputs.total_paid.is_positive(),
            StatusCondition::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRule {
    pub condition: StatusCondition,
    pub status: PaymentStatus,
}

/// ordered decision table; the first rule whose condition holds wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRules {
    rules: Vec<StatusRule>,
}

impl StatusRules {
    /// overdue, paid, partial, unpaid
    pub fn standard() -> Self {
        Self {
            rules: vec![
                StatusRule { condition: StatusCondition::Flagged, status: PaymentStatus::Overdue },
                StatusRule { condition: StatusCondition::Settled, status: PaymentStatus::Paid },
                StatusRule { condition: StatusCondition::PartlyPaid, status: PaymentStatus::Partial },
                StatusRule { condition: StatusCondition::Always, status: PaymentStatus::Unpaid },
            ],
        }
    }

    pub fn for_policy(zero_obligation: ZeroObligationStatus) -> Self {
        let mut rules = Self::standard();
        if zero_obligation == ZeroObligationStatus::NotApplicable {
            // after the overdue flag, before everything else
            rules.rules.insert(
                1,
                StatusRule {
                    condition: StatusCondition::NothingBilled,
                    status: PaymentStatus::NotApplicable,
                },
            );
        }
        rules
    }

    pub fn rules(&self) -> &[StatusRule] {
        &self.rules
    }

    pub fn evaluate(&self, inputs: &StatusInputs) -> PaymentStatus {
        self.rules
            .iter()
            .find(|rule| rule.condition.holds(inputs))
            .map(|rule| rule.status)
            .unwrap_or(PaymentStatus::Unpaid)
    }
}

impl Default for StatusRules {
    fn default() -> Self {
        Self::standard()
    }
}
