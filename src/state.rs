use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{FeeRecordId, SchoolYear, StudentId};

/// identifies one student's ledger for one billing period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub student_id: StudentId,
    pub school_year: SchoolYear,
}

impl LedgerKey {
    pub fn new(student_id: StudentId, school_year: SchoolYear) -> Self {
        Self {
            student_id,
            school_year,
        }
    }
}

/// persisted ledger row for a student and school year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentFeeRecord {
    pub id: FeeRecordId,
    pub student_id: StudentId,
    pub school_year: SchoolYear,

    // figures, refreshed from the aggregator on every mutation
    pub total_amount: Money,
    pub grant_discount: Money,
    pub total_paid: Money,
    pub balance: Money,

    // overdue flag, owned by the overdue manager
    pub is_overdue: bool,
    pub due_date: Option<NaiveDate>,

    /// bumped on every committed write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentFeeRecord {
    /// new row with no payments and no overdue flag
    pub fn new(key: &LedgerKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: key.student_id,
            school_year: key.school_year.clone(),
            total_amount: Money::ZERO,
            grant_discount: Money::ZERO,
            total_paid: Money::ZERO,
            balance: Money::ZERO,
            is_overdue: false,
            due_date: None,
            version: 0,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.student_id, self.school_year.clone())
    }

    /// overwrite the money columns, keeping the balance invariant
    pub fn apply_figures(
        &mut self,
        total_amount: Money,
        grant_discount: Money,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    ) {
        self.total_amount = total_amount;
        self.grant_discount = grant_discount;
        self.total_paid = total_paid;
        self.balance = (total_amount - grant_discount - total_paid).non_negative();
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_figures_clamps_balance() {
        let key = LedgerKey::new(Uuid::new_v4(), SchoolYear::new(2024));
        let now = Utc::now();
        let mut record = StudentFeeRecord::new(&key, now);

        record.apply_figures(Money::from_major(10_000), Money::from_major(2_000), Money::from_major(3_000), now);
        assert_eq!(record.balance, Money::from_major(5_000));

        record.apply_figures(Money::from_major(10_000), Money::from_major(8_000), Money::from_major(3_000), now);
        assert_eq!(record.balance, Money::ZERO);
        assert_eq!(record.key(), key);
    }
}
