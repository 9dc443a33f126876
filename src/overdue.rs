use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::fees::StudentScope;
use crate::state::StudentFeeRecord;
use crate::types::{Classification, DepartmentId, SchoolYear, StudentId, YearLevelId};

/// overdue state of a fee record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverdueState {
    Current,
    Overdue,
}

impl OverdueState {
    pub fn of(record: &StudentFeeRecord) -> Self {
        if record.is_overdue {
            OverdueState::Overdue
        } else {
            OverdueState::Current
        }
    }
}

/// selects records for a bulk overdue run; unset fields match everything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueFilter {
    pub school_year: SchoolYear,
    pub classification: Option<Classification>,
    pub department_id: Option<DepartmentId>,
    pub year_level_id: Option<YearLevelId>,
}

impl OverdueFilter {
    pub fn for_year(school_year: SchoolYear) -> Self {
        Self {
            school_year,
            classification: None,
            department_id: None,
            year_level_id: None,
        }
    }

    pub fn matches(&self, student: &StudentScope) -> bool {
        let classification_ok = self
            .classification
            .as_ref()
            .map_or(true, |c| student.classification.as_ref() == Some(c));
        let department_ok = self
            .department_id
            .map_or(true, |d| student.department_id == Some(d));
        let year_level_ok = self
            .year_level_id
            .map_or(true, |y| student.year_level_id == Some(y));

        classification_ok && department_ok && year_level_ok
    }
}

/// outcome of a bulk overdue run
///
/// Records are marked one transaction at a time; a failing record does not
/// undo or stop the others.
#[derive(Debug, Default)]
pub struct BulkOverdueReport {
    pub marked: Vec<StudentId>,
    pub failed: Vec<BulkOverdueFailure>,
}

impl BulkOverdueReport {
    pub fn affected(&self) -> usize {
        self.marked.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct BulkOverdueFailure {
    pub student_id: StudentId,
    pub error: LedgerError,
}

/// transitions on the overdue flag of a fee record
///
/// `balance` is always the freshly aggregated balance, not the cached column.
pub struct OverdueManager;

impl OverdueManager {
    pub fn mark_overdue(
        record: &mut StudentFeeRecord,
        balance: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    ) -> Result<OverdueState> {
        if !balance.is_positive() {
            return Err(LedgerError::OverdueRequiresBalance { balance });
        }

        record.is_overdue = true;
        record.due_date = Some(due_date);
        record.updated_at = timestamp;
        Ok(OverdueState::Overdue)
    }

    /// unconditional; due date and balance are left alone
    pub fn clear_overdue(record: &mut StudentFeeRecord, timestamp: DateTime<Utc>) -> OverdueState {
        record.is_overdue = false;
        record.updated_at = timestamp;
        OverdueState::Current
    }

    /// whether a bulk run should mark this record
    pub fn eligible_for_bulk(record: &StudentFeeRecord, balance: Money) -> bool {
        balance.is_positive() && !record.is_overdue
    }
}
