use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::errors::{LedgerError, Result};
use crate::fees::{Department, FeeItem, Student};
use crate::grants::{Grant, GrantAssignment};
use crate::payments::PaymentRecord;
use crate::state::{LedgerKey, StudentFeeRecord};
use crate::store::{LedgerRows, LedgerStore};
use crate::types::{
    AssignmentId, DepartmentId, FeeItemId, FeeRecordId, GrantId, PaymentId, SchoolYear, StudentId,
};

#[derive(Debug, Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    departments: HashMap<DepartmentId, Department>,
    fee_items: HashMap<FeeItemId, FeeItem>,
    grants: HashMap<GrantId, Grant>,
    assignments: HashMap<AssignmentId, GrantAssignment>,
    records: HashMap<LedgerKey, StudentFeeRecord>,
    payments: HashMap<PaymentId, PaymentRecord>,
}

impl Tables {
    fn rows(&self, key: &LedgerKey) -> LedgerRows {
        let record = self.records.get(key).cloned();

        let mut payments: Vec<PaymentRecord> = match &record {
            Some(record) => self
                .payments
                .values()
                .filter(|p| p.student_fee_id == Some(record.id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut assignments: Vec<GrantAssignment> = self
            .assignments
            .values()
            .filter(|a| a.student_id == key.student_id && a.school_year == key.school_year)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then(a.id.cmp(&b.id)));

        LedgerRows {
            key: key.clone(),
            record,
            payments,
            assignments,
        }
    }
}

/// in-process store backed by hash maps
///
/// Table access goes through one `RwLock`; each ledger key additionally has
/// its own mutex held for the whole of a transaction, so two writers on the
/// same student and year run one after the other. A key's mutex lives only
/// while some transaction on that key is running or waiting.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    key_locks: Mutex<HashMap<LedgerKey, Arc<Mutex<()>>>>,
}

fn poisoned<E>(_: E) -> LedgerError {
    LedgerError::Storage {
        message: "store lock poisoned".to_string(),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_department(&self, department: Department) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.departments.insert(department.id, department);
        Ok(())
    }

    pub fn insert_student(&self, student: Student) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.students.insert(student.id, student);
        Ok(())
    }

    /// insert or replace a fee item
    pub fn upsert_fee_item(&self, item: FeeItem) -> Result<()> {
        item.validate()?;
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.fee_items.insert(item.id, item);
        Ok(())
    }

    pub fn set_fee_item_active(&self, id: FeeItemId, is_active: bool) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let item = tables.fee_items.get_mut(&id).ok_or(LedgerError::InvalidFeeItem {
            id,
            message: "no such fee item".to_string(),
        })?;
        item.is_active = is_active;
        Ok(())
    }

    pub fn insert_grant(&self, grant: Grant) -> Result<()> {
        grant.validate()?;
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.grants.insert(grant.id, grant);
        Ok(())
    }

    /// record a payment outside any ledger transaction, e.g. an imported
    /// general posting with no fee record
    pub fn insert_payment(&self, payment: PaymentRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    pub fn payments_for_student(&self, student_id: StudentId) -> Result<Vec<PaymentRecord>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut payments: Vec<PaymentRecord> = tables
            .payments
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(payments)
    }

    fn key_lock(&self, key: &LedgerKey) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.key_locks.lock().map_err(poisoned)?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// drop the key's mutex once no other transaction holds or waits on it
    fn release_key_lock(&self, key: &LedgerKey, lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.key_locks.lock() {
            // the map and `lock` are the only owners
            if Arc::strong_count(&lock) == 2 {
                locks.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn held_key_locks(&self) -> usize {
        self.key_locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    fn commit(&self, mut rows: LedgerRows, base_version: Option<u64>) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;

        let found = tables.records.get(&rows.key).map(|r| r.version);
        if found != base_version {
            warn!(
                student_id = %rows.key.student_id,
                school_year = %rows.key.school_year,
                "fee record changed underneath transaction"
            );
            return Err(LedgerError::ConcurrentModification {
                expected: base_version.unwrap_or(0),
                found: found.unwrap_or(0),
            });
        }

        if let Some(mut record) = rows.record.take() {
            record.version = base_version.map_or(1, |v| v + 1);

            tables.payments.retain(|_, p| p.student_fee_id != Some(record.id));
            for payment in rows.payments.drain(..) {
                tables.payments.insert(payment.id, payment);
            }

            debug!(fee_record_id = %record.id, version = record.version, "committing fee record");
            tables.records.insert(rows.key.clone(), record);
        }

        let key = &rows.key;
        tables
            .assignments
            .retain(|_, a| !(a.student_id == key.student_id && a.school_year == key.school_year));
        for assignment in rows.assignments.drain(..) {
            tables.assignments.insert(assignment.id, assignment);
        }

        Ok(())
    }
}

impl LedgerStore for InMemoryStore {
    fn student(&self, id: StudentId) -> Result<Option<Student>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.students.get(&id).cloned())
    }

    fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.departments.get(&id).cloned())
    }

    fn fee_items(&self, school_year: &SchoolYear) -> Result<Vec<FeeItem>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut items: Vec<FeeItem> = tables
            .fee_items
            .values()
            .filter(|item| &item.school_year == school_year)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    fn school_years(&self) -> Result<Vec<SchoolYear>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let years: BTreeSet<SchoolYear> = tables
            .fee_items
            .values()
            .map(|item| item.school_year.clone())
            .chain(tables.records.keys().map(|key| key.school_year.clone()))
            .collect();
        Ok(years.into_iter().collect())
    }

    fn grant(&self, id: GrantId) -> Result<Option<Grant>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.grants.get(&id).cloned())
    }

    fn grant_assignment(&self, id: AssignmentId) -> Result<Option<GrantAssignment>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.assignments.get(&id).cloned())
    }

    fn fee_records(&self, school_year: &SchoolYear) -> Result<Vec<StudentFeeRecord>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut records: Vec<StudentFeeRecord> = tables
            .records
            .values()
            .filter(|r| &r.school_year == school_year)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(records)
    }

    fn fee_record_by_id(&self, id: FeeRecordId) -> Result<Option<StudentFeeRecord>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.records.values().find(|r| r.id == id).cloned())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.payments.get(&id).cloned())
    }

    fn load(&self, key: &LedgerKey) -> Result<LedgerRows> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.rows(key))
    }

    fn transaction<T, F>(&self, key: &LedgerKey, work: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerRows) -> Result<T>,
    {
        let lock = self.key_lock(key)?;
        let result = match lock.lock() {
            Ok(_guard) => self.load(key).and_then(|mut rows| {
                let base_version = rows.record.as_ref().map(|r| r.version);

                // on error the working set is dropped and nothing is written
                let result = work(&mut rows)?;
                self.commit(rows, base_version)?;
                Ok(result)
            }),
            Err(error) => Err(poisoned(error)),
        };

        self.release_key_lock(key, lock);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::payments::PaymentRequest;
    use crate::types::PaymentMethod;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn key() -> LedgerKey {
        LedgerKey::new(Uuid::new_v4(), SchoolYear::new(2024))
    }

    fn payment(key: &LedgerKey, record: &StudentFeeRecord, amount: i64) -> PaymentRecord {
        let request = PaymentRequest {
            student_id: key.student_id,
            school_year: key.school_year.clone(),
            tendered: Money::from_major(amount),
            payment_date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            method: PaymentMethod::Cash,
            reference: None,
            recorded_by: "cashier".to_string(),
        };
        PaymentRecord::new(&request, record.id, Money::from_major(amount), Utc::now())
    }

    #[test]
    fn test_commit_writes_rows_and_bumps_version() {
        let store = InMemoryStore::new();
        let key = key();

        store
            .transaction(&key, |rows| {
                let record = StudentFeeRecord::new(&rows.key, Utc::now());
                rows.payments.push(payment(&rows.key, &record, 500));
                rows.record = Some(record);
                Ok(())
            })
            .unwrap();

        let rows = store.load(&key).unwrap();
        let record = rows.record.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(rows.payments.len(), 1);

        store.transaction(&key, |rows| {
            rows.payments.clear();
            Ok(())
        }).unwrap();

        let rows = store.load(&key).unwrap();
        assert_eq!(rows.record.unwrap().version, 2);
        assert!(rows.payments.is_empty());
    }

    #[test]
    fn test_failed_transaction_writes_nothing() {
        let store = InMemoryStore::new();
        let key = key();

        let result: Result<()> = store.transaction(&key, |rows| {
            let record = StudentFeeRecord::new(&rows.key, Utc::now());
            rows.payments.push(payment(&rows.key, &record, 500));
            rows.record = Some(record);
            Err(LedgerError::Storage {
                message: "recompute failed".to_string(),
            })
        });

        assert!(result.is_err());
        let rows = store.load(&key).unwrap();
        assert!(rows.record.is_none());
        assert!(rows.payments.is_empty());
        assert!(store.payments_for_student(key.student_id).unwrap().is_empty());
    }

    #[test]
    fn test_key_locks_released_after_transactions() {
        let store = Arc::new(InMemoryStore::new());
        let keys: Vec<LedgerKey> = (0..8).map(|_| key()).collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let keys = keys.clone();
                std::thread::spawn(move || {
                    for key in &keys {
                        store
                            .transaction(key, |rows| {
                                if rows.record.is_none() {
                                    rows.record = Some(StudentFeeRecord::new(&rows.key, Utc::now()));
                                }
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let failed: Result<()> = store.transaction(&key(), |_| {
            Err(LedgerError::Storage {
                message: "boom".to_string(),
            })
        });
        assert!(failed.is_err());

        assert_eq!(store.held_key_locks(), 0);
        for key in &keys {
            // one commit per thread, none lost
            assert_eq!(store.load(key).unwrap().record.unwrap().version, 4);
        }
    }

    #[test]
    fn test_school_years_are_sorted_and_distinct() {
        let store = InMemoryStore::new();
        store.upsert_fee_item(FeeItem::for_all("Tuition", SchoolYear::new(2024), Money::from_major(1))).unwrap();
        store.upsert_fee_item(FeeItem::for_all("Misc", SchoolYear::new(2024), Money::from_major(1))).unwrap();
        store.upsert_fee_item(FeeItem::for_all("Tuition", SchoolYear::new(2022), Money::from_major(1))).unwrap();

        let years = store.school_years().unwrap();
        assert_eq!(years, vec![SchoolYear::new(2022), SchoolYear::new(2024)]);
    }

    #[test]
    fn test_rejects_invalid_seed_data() {
        let store = InMemoryStore::new();
        let bad = FeeItem::for_all("Bad", SchoolYear::new(2024), Money::from_major(-1));
        assert!(store.upsert_fee_item(bad).is_err());
        assert!(store.fee_items(&SchoolYear::new(2024)).unwrap().is_empty());
    }
}
