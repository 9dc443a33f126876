use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::LedgerError;

pub type StudentId = Uuid;
pub type DepartmentId = Uuid;
pub type ProgramId = Uuid;
pub type YearLevelId = Uuid;
pub type SectionId = Uuid;
pub type FeeItemId = Uuid;
pub type GrantId = Uuid;
pub type AssignmentId = Uuid;
pub type FeeRecordId = Uuid;
pub type PaymentId = Uuid;

/// academic billing period written as `"2024-2025"`
///
/// Ordered by start year so earlier periods sort first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchoolYear {
    start: i32,
}

impl SchoolYear {
    pub fn new(start: i32) -> Self {
        Self { start }
    }

    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        let invalid = || LedgerError::InvalidSchoolYear {
            value: value.to_string(),
        };

        let (start, end) = value.trim().split_once('-').ok_or_else(invalid)?;
        let start: i32 = start.trim().parse().map_err(|_| invalid())?;
        let end: i32 = end.trim().parse().map_err(|_| invalid())?;

        if end != start + 1 || start < 1900 {
            return Err(invalid());
        }

        Ok(Self { start })
    }

    pub fn start_year(&self) -> i32 {
        self.start
    }

    pub fn end_year(&self) -> i32 {
        self.start + 1
    }

    pub fn previous(&self) -> Self {
        Self { start: self.start - 1 }
    }
}

impl fmt::Display for SchoolYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end_year())
    }
}

impl FromStr for SchoolYear {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchoolYear::parse(s)
    }
}

impl TryFrom<String> for SchoolYear {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SchoolYear::parse(&value)
    }
}

impl From<SchoolYear> for String {
    fn from(year: SchoolYear) -> Self {
        year.to_string()
    }
}

impl PartialOrd for SchoolYear {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchoolYear {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start)
    }
}

/// department classification (e.g. "college", "senior_high"), compared by exact value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification(String);

impl Classification {
    pub fn new(value: impl Into<String>) -> Self {
        Classification(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// who a fee item is billed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentScope {
    /// every student in the school year
    All,
    /// only students matching the item's scope filters
    Specific,
}

/// how a grant's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// flat amount off the base
    Fixed,
    /// percent of the base, 0..=100
    Percentage,
}

/// grant assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Inactive,
    Graduated,
    Withdrawn,
}

impl GrantStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, GrantStatus::Active)
    }
}

/// derived payment status of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Overdue,
    /// nothing billed; only produced when configured
    NotApplicable,
}

/// how a payment was tendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    BankTransfer,
    Online,
}

impl PaymentMethod {
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}
