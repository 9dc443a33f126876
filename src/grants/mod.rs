pub mod calculator;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{AssignmentId, GrantId, GrantStatus, GrantType, SchoolYear, StudentId};

pub use calculator::GrantCalculator;

/// scholarship or discount rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub name: String,
    pub grant_type: GrantType,
    /// flat amount for fixed grants, percent for percentage grants
    pub value: Decimal,
}

impl Grant {
    pub fn fixed(name: impl Into<String>, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            grant_type: GrantType::Fixed,
            value: amount.as_decimal(),
        }
    }

    pub fn percentage(name: impl Into<String>, percent: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            grant_type: GrantType::Percentage,
            value: percent,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.value < Decimal::ZERO {
            return Err(LedgerError::InvalidGrantValue {
                value: self.value,
                message: "grant value must not be negative".to_string(),
            });
        }
        if self.grant_type == GrantType::Percentage && self.value > Decimal::from(100) {
            return Err(LedgerError::InvalidGrantValue {
                value: self.value,
                message: "percentage grants cannot exceed 100".to_string(),
            });
        }
        Ok(())
    }
}

/// a grant given to one student for one school year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantAssignment {
    pub id: AssignmentId,
    pub grant_id: GrantId,
    pub student_id: StudentId,
    pub school_year: SchoolYear,
    pub status: GrantStatus,
    /// cached discount, refreshed whenever the student's assignments change
    pub discount_amount: Money,
    pub assigned_at: DateTime<Utc>,
}

impl GrantAssignment {
    pub fn new(
        grant_id: GrantId,
        student_id: StudentId,
        school_year: SchoolYear,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            grant_id,
            student_id,
            school_year,
            status: GrantStatus::Active,
            discount_amount: Money::ZERO,
            assigned_at,
        }
    }
}
