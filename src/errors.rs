use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{PaymentMethod, SchoolYear};

/// coarse classification of a failure, for callers mapping errors to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// malformed input, rejected before any state mutation
    Validation,
    /// referenced entity does not exist
    NotFound,
    /// well-formed request refused by ledger policy
    PolicyViolation,
    /// backing store failure or lost race
    Storage,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("payment below minimum: minimum {minimum}, provided {provided}")]
    PaymentBelowMinimum {
        minimum: Money,
        provided: Money,
    },

    #[error("payment reference required for {method:?} payments")]
    MissingPaymentReference {
        method: PaymentMethod,
    },

    #[error("payment dated in the future: {date}")]
    PaymentDateInFuture {
        date: chrono::NaiveDate,
    },

    #[error("invalid school year: {value:?}")]
    InvalidSchoolYear {
        value: String,
    },

    #[error("invalid grant value {value}: {message}")]
    InvalidGrantValue {
        value: rust_decimal::Decimal,
        message: String,
    },

    #[error("invalid fee item {id}: {message}")]
    InvalidFeeItem {
        id: Uuid,
        message: String,
    },

    #[error("grant {grant_id} already active for school year {school_year}")]
    DuplicateGrantAssignment {
        grant_id: Uuid,
        school_year: SchoolYear,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("student not found: {id}")]
    StudentNotFound {
        id: Uuid,
    },

    #[error("department not found: {id}")]
    DepartmentNotFound {
        id: Uuid,
    },

    #[error("grant not found: {id}")]
    GrantNotFound {
        id: Uuid,
    },

    #[error("grant assignment not found: {id}")]
    AssignmentNotFound {
        id: Uuid,
    },

    #[error("fee record not found for student {student_id} in {school_year}")]
    FeeRecordNotFound {
        student_id: Uuid,
        school_year: SchoolYear,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: Uuid,
    },

    #[error("payment {id} is not posted against a fee record")]
    UnlinkedPayment {
        id: Uuid,
    },

    #[error("cannot mark overdue: balance is {balance}")]
    OverdueRequiresBalance {
        balance: Money,
    },

    #[error("nothing outstanding to apply a payment of {tendered} to")]
    NothingOutstanding {
        tendered: Money,
    },

    #[error("concurrent modification: expected version {expected}, found {found}")]
    ConcurrentModification {
        expected: u64,
        found: u64,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidPaymentAmount { .. }
            | LedgerError::PaymentBelowMinimum { .. }
            | LedgerError::MissingPaymentReference { .. }
            | LedgerError::PaymentDateInFuture { .. }
            | LedgerError::InvalidSchoolYear { .. }
            | LedgerError::InvalidGrantValue { .. }
            | LedgerError::InvalidFeeItem { .. }
            | LedgerError::DuplicateGrantAssignment { .. }
            | LedgerError::InvalidConfiguration { .. }
            | LedgerError::UnlinkedPayment { .. }
            | LedgerError::Serialization(_) => ErrorKind::Validation,

            LedgerError::StudentNotFound { .. }
            | LedgerError::DepartmentNotFound { .. }
            | LedgerError::GrantNotFound { .. }
            | LedgerError::AssignmentNotFound { .. }
            | LedgerError::FeeRecordNotFound { .. }
            | LedgerError::PaymentNotFound { .. } => ErrorKind::NotFound,

            LedgerError::OverdueRequiresBalance { .. } | LedgerError::NothingOutstanding { .. } => {
                ErrorKind::PolicyViolation
            }

            LedgerError::ConcurrentModification { .. } | LedgerError::Storage { .. } => {
                ErrorKind::Storage
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
