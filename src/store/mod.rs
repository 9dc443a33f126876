pub mod memory;

use crate::errors::Result;
use crate::fees::{Department, FeeItem, Student};
use crate::grants::{Grant, GrantAssignment};
use crate::payments::PaymentRecord;
use crate::state::{LedgerKey, StudentFeeRecord};
use crate::types::{
    AssignmentId, DepartmentId, FeeRecordId, GrantId, PaymentId, SchoolYear, StudentId,
};

pub use memory::InMemoryStore;

/// mutable rows of one ledger key, loaded for a transaction
///
/// Holds the fee record, the payments posted against it and the student's
/// grant assignments for the year. Changes are written back only when the
/// transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRows {
    pub key: LedgerKey,
    pub record: Option<StudentFeeRecord>,
    pub payments: Vec<PaymentRecord>,
    pub assignments: Vec<GrantAssignment>,
}

impl LedgerRows {
    pub fn empty(key: LedgerKey) -> Self {
        Self {
            key,
            record: None,
            payments: Vec::new(),
            assignments: Vec::new(),
        }
    }
}

/// data access the ledger engine needs
///
/// Read methods return committed state. Every mutation goes through
/// [`LedgerStore::transaction`], which serializes writers of the same key and
/// discards the working set when the closure fails.
pub trait LedgerStore: Send + Sync {
    fn student(&self, id: StudentId) -> Result<Option<Student>>;

    fn department(&self, id: DepartmentId) -> Result<Option<Department>>;

    /// all fee items, active or not, for a school year
    fn fee_items(&self, school_year: &SchoolYear) -> Result<Vec<FeeItem>>;

    /// every school year that has fee items or fee records
    fn school_years(&self) -> Result<Vec<SchoolYear>>;

    fn grant(&self, id: GrantId) -> Result<Option<Grant>>;

    fn grant_assignment(&self, id: AssignmentId) -> Result<Option<GrantAssignment>>;

    fn fee_records(&self, school_year: &SchoolYear) -> Result<Vec<StudentFeeRecord>>;

    fn fee_record_by_id(&self, id: FeeRecordId) -> Result<Option<StudentFeeRecord>>;

    fn payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>>;

    /// consistent read of a key's rows
    fn load(&self, key: &LedgerKey) -> Result<LedgerRows>;

    /// run `work` against the key's rows while holding the key's lock;
    /// commit on `Ok`, discard on `Err`
    fn transaction<T, F>(&self, key: &LedgerKey, work: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerRows) -> Result<T>;
}
