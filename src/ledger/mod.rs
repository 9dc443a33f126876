pub mod aggregator;
pub mod carry;
pub mod status;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{FeeRecordId, PaymentStatus, SchoolYear, StudentId};

pub use aggregator::LedgerAggregator;
pub use carry::{CarryBack, YearPosition};
pub use status::{StatusCondition, StatusInputs, StatusRule, StatusRules};

/// computed-on-read summary of one student's ledger for one school year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub student_id: StudentId,
    pub school_year: SchoolYear,
    pub total_amount: Money,
    pub grant_discount: Money,
    pub total_paid: Money,
    pub balance: Money,
    pub status: PaymentStatus,
    pub is_overdue: bool,
    pub due_date: Option<NaiveDate>,
    /// persisted row backing this ledger, if one has been created
    pub fee_record_id: Option<FeeRecordId>,
    pub payment_count: usize,
}

impl LedgerSnapshot {
    /// amount still owed after discounts
    pub fn net_obligation(&self) -> Money {
        (self.total_amount - self.grant_discount).non_negative()
    }

    pub fn is_settled(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}
