use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::fees::{FeeResolution, FeeResolver, StudentScope};
use crate::grants::{Grant, GrantAssignment, GrantCalculator};
use crate::ledger::{CarryBack, LedgerAggregator, LedgerSnapshot, YearPosition};
use crate::overdue::{BulkOverdueFailure, BulkOverdueReport, OverdueFilter, OverdueManager};
use crate::payments::{
    carried_back_against, Allocation, PaymentAllocator, PaymentEdit, PaymentRecord, PaymentRequest,
    PaymentValidator,
};
use crate::serialization::LedgerStatement;
use crate::state::{LedgerKey, StudentFeeRecord};
use crate::store::{LedgerRows, LedgerStore};
use crate::types::{AssignmentId, FeeRecordId, GrantId, GrantStatus, PaymentId, SchoolYear, StudentId};

/// result of posting a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: PaymentRecord,
    pub allocation: Allocation,
    /// ledger of the paid school year after the payment
    pub snapshot: LedgerSnapshot,
}

/// a year's ledger with carried credit settled, and what earlier years still owe
struct Position {
    snapshot: LedgerSnapshot,
    previous_balance: Money,
}

/// tuition ledger over a data store
///
/// Figures are recomputed from fee items, grant assignments and payments on
/// every call. Mutations run inside a store transaction for the affected
/// student and school year.
///
/// Events from committed mutations are buffered until [`take_events`] drains
/// them; the buffer is unbounded.
///
/// [`take_events`]: TuitionLedger::take_events
pub struct TuitionLedger<S: LedgerStore> {
    store: S,
    config: LedgerConfig,
    aggregator: LedgerAggregator,
    events: Mutex<EventStore>,
}

impl<S: LedgerStore> TuitionLedger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: LedgerAggregator::new(&config),
            store,
            config,
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// drain events emitted by committed mutations
    pub fn take_events(&self) -> Result<Vec<Event>> {
        let mut events = self.events.lock().map_err(|_| LedgerError::Storage {
            message: "event store lock poisoned".to_string(),
        })?;
        Ok(events.take_events())
    }

    fn publish(&self, events: Vec<Event>) -> Result<()> {
        let mut store = self.events.lock().map_err(|_| LedgerError::Storage {
            message: "event store lock poisoned".to_string(),
        })?;
        store.extend(events);
        Ok(())
    }

    fn student_scope(&self, student_id: StudentId) -> Result<StudentScope> {
        let student = self
            .store
            .student(student_id)?
            .ok_or(LedgerError::StudentNotFound { id: student_id })?;

        let department = match student.department_id {
            Some(id) => Some(
                self.store
                    .department(id)?
                    .ok_or(LedgerError::DepartmentNotFound { id })?,
            ),
            None => None,
        };

        Ok(StudentScope::resolve(&student, department.as_ref()))
    }

    fn fees_for_scope(&self, scope: &StudentScope, school_year: Option<&SchoolYear>) -> Result<FeeResolution> {
        let candidates = match school_year {
            Some(year) => self.store.fee_items(year)?,
            None => Vec::new(),
        };
        Ok(FeeResolver::resolve(scope, school_year, &candidates))
    }

    /// fee items billed to a student; empty when no school year is given
    pub fn resolve_fees(&self, student_id: StudentId, school_year: Option<&SchoolYear>) -> Result<FeeResolution> {
        let scope = self.student_scope(student_id)?;
        self.fees_for_scope(&scope, school_year)
    }

    /// own-year position of a key; years without a fee record hold no position
    fn year_position(&self, rows: &LedgerRows, fees: &FeeResolution) -> Option<YearPosition> {
        let record = rows.record.as_ref()?;
        let own = self
            .aggregator
            .aggregate(&rows.key, fees, &rows.assignments, &rows.payments, Some(record));
        Some(YearPosition {
            school_year: rows.key.school_year.clone(),
            own_balance: own.balance,
            carried_back: carried_back_against(&rows.payments, Some(record.id)),
        })
    }

    /// settle carried credit across every year the student has a fee record
    /// for, with `rows` standing in for the committed rows of its own key
    fn position(&self, rows: &LedgerRows, fees: &FeeResolution) -> Result<Position> {
        let scope = self.student_scope(rows.key.student_id)?;
        let mut years = self.store.school_years()?;
        if !years.contains(&rows.key.school_year) {
            years.push(rows.key.school_year.clone());
            years.sort();
        }

        let mut positions = Vec::new();
        for year in years {
            let position = if year == rows.key.school_year {
                self.year_position(rows, fees)
            } else {
                let other = self.store.load(&LedgerKey::new(rows.key.student_id, year.clone()))?;
                let other_fees = self.fees_for_scope(&scope, Some(&year))?;
                self.year_position(&other, &other_fees)
            };
            positions.extend(position);
        }

        let carried_in = CarryBack::settle(&positions);
        let mut previous_balance = Money::ZERO;
        let mut own_credit = Money::ZERO;
        for (position, credit) in positions.iter().zip(carried_in) {
            if position.school_year < rows.key.school_year {
                previous_balance += (position.own_balance - credit).non_negative();
            } else if position.school_year == rows.key.school_year {
                own_credit = credit;
            }
        }

        let snapshot = self.aggregator.aggregate_with_credit(
            &rows.key,
            fees,
            &rows.assignments,
            &rows.payments,
            rows.record.as_ref(),
            own_credit,
        );
        Ok(Position {
            snapshot,
            previous_balance,
        })
    }

    fn committed_position(&self, student_id: StudentId, school_year: &SchoolYear) -> Result<(Position, FeeResolution, LedgerRows)> {
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let rows = self.store.load(&LedgerKey::new(student_id, school_year.clone()))?;
        let position = self.position(&rows, &fees)?;
        Ok((position, fees, rows))
    }

    /// current ledger figures for a student and school year
    #[instrument(skip(self), fields(student_id = %student_id, school_year = %school_year))]
    pub fn snapshot(&self, student_id: StudentId, school_year: &SchoolYear) -> Result<LedgerSnapshot> {
        Ok(self.committed_position(student_id, school_year)?.0.snapshot)
    }

    /// sum of active grant discounts, uncapped
    pub fn total_discount(&self, student_id: StudentId, school_year: &SchoolYear) -> Result<Money> {
        self.student_scope(student_id)?;
        let rows = self.store.load(&LedgerKey::new(student_id, school_year.clone()))?;
        Ok(GrantCalculator::total_discount(&rows.assignments))
    }

    /// unpaid balance of earlier school years the student has a fee record for
    pub fn previous_balance(&self, student_id: StudentId, school_year: &SchoolYear) -> Result<Money> {
        Ok(self.committed_position(student_id, school_year)?.0.previous_balance)
    }

    /// split `tendered` across the two balances without touching any ledger
    pub fn allocate(&self, tendered: Money, previous_balance: Money, current_balance: Money) -> Result<Allocation> {
        PaymentAllocator::allocate(tendered, previous_balance, current_balance)
    }

    /// what a payment of `tendered` would pay down right now
    pub fn preview_allocation(
        &self,
        student_id: StudentId,
        school_year: &SchoolYear,
        tendered: Money,
    ) -> Result<Allocation> {
        let (position, _, _) = self.committed_position(student_id, school_year)?;
        self.allocate(tendered, position.previous_balance, position.snapshot.balance)
    }

    /// printable view of a student's ledger
    pub fn statement(&self, student_id: StudentId, school_year: &SchoolYear) -> Result<LedgerStatement> {
        let (position, fees, rows) = self.committed_position(student_id, school_year)?;
        let grants = self.grants_for(&rows.assignments)?;
        Ok(LedgerStatement::build(
            position.snapshot,
            position.previous_balance,
            &fees,
            &rows.assignments,
            &grants,
            &rows.payments,
        ))
    }

    fn ensure_record(rows: &mut LedgerRows, now: DateTime<Utc>, events: &mut Vec<Event>) -> FeeRecordId {
        if let Some(record) = &rows.record {
            return record.id;
        }

        let record = StudentFeeRecord::new(&rows.key, now);
        events.push(Event::FeeRecordCreated {
            fee_record_id: record.id,
            student_id: rows.key.student_id,
            school_year: rows.key.school_year.clone(),
            timestamp: now,
        });
        let id = record.id;
        rows.record = Some(record);
        id
    }

    /// recompute and write the figures onto the record, if there is one
    fn refresh(
        &self,
        rows: &mut LedgerRows,
        fees: &FeeResolution,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<LedgerSnapshot> {
        let snapshot = self.position(rows, fees)?.snapshot;
        if let Some(record) = rows.record.as_mut() {
            record.apply_figures(snapshot.total_amount, snapshot.grant_discount, snapshot.total_paid, now);
            events.push(Event::LedgerRecomputed {
                student_id: rows.key.student_id,
                school_year: rows.key.school_year.clone(),
                total_amount: record.total_amount,
                grant_discount: record.grant_discount,
                total_paid: record.total_paid,
                balance: record.balance,
                timestamp: now,
            });
        }
        Ok(snapshot)
    }

    /// rewrite the cached figures of earlier years after carried credit moved
    ///
    /// Runs after the payment itself committed, so a failure here is logged
    /// and left for the next recompute of that year.
    fn refresh_earlier_years(&self, key: &LedgerKey, now: DateTime<Utc>) {
        let years = match self.store.school_years() {
            Ok(years) => years,
            Err(error) => {
                warn!(error = %error, "could not list school years to refresh");
                return;
            }
        };

        for year in years.into_iter().filter(|y| y < &key.school_year) {
            let earlier = LedgerKey::new(key.student_id, year);
            let mut events = Vec::new();
            let refreshed = self.resolve_fees(earlier.student_id, Some(&earlier.school_year)).and_then(|fees| {
                self.store.transaction(&earlier, |rows| {
                    if rows.record.is_none() {
                        return Ok(());
                    }
                    self.refresh(rows, &fees, now, &mut events).map(|_| ())
                })
            });

            match refreshed.and_then(|_| self.publish(events)) {
                Ok(()) => {}
                Err(error) => warn!(
                    school_year = %earlier.school_year,
                    error = %error,
                    "earlier year left with stale cached figures"
                ),
            }
        }
    }

    fn grants_for(&self, assignments: &[GrantAssignment]) -> Result<HashMap<GrantId, Grant>> {
        let mut grants = HashMap::new();
        for assignment in assignments {
            if grants.contains_key(&assignment.grant_id) {
                continue;
            }
            if let Some(grant) = self.store.grant(assignment.grant_id)? {
                grants.insert(grant.id, grant);
            }
        }
        Ok(grants)
    }

    fn recompute_discounts_in(
        &self,
        rows: &mut LedgerRows,
        fees: &FeeResolution,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<LedgerSnapshot> {
        let grants = self.grants_for(&rows.assignments)?;
        let total_discount = GrantCalculator::recompute(&mut rows.assignments, &grants, fees.total)?;
        events.push(Event::DiscountsRecomputed {
            student_id: rows.key.student_id,
            school_year: rows.key.school_year.clone(),
            total_discount,
            timestamp: now,
        });
        self.refresh(rows, fees, now, events)
    }

    fn key_for_fee_record(&self, fee_record_id: Option<FeeRecordId>, payment_id: PaymentId) -> Result<LedgerKey> {
        let fee_record_id = fee_record_id.ok_or(LedgerError::UnlinkedPayment { id: payment_id })?;
        let record = self
            .store
            .fee_record_by_id(fee_record_id)?
            .ok_or(LedgerError::UnlinkedPayment { id: payment_id })?;
        Ok(record.key())
    }

    /// enroll a student for a school year by creating its fee record
    ///
    /// Earlier years count towards the previous balance only once they have
    /// a fee record.
    #[instrument(skip(self, time), fields(student_id = %student_id, school_year = %school_year))]
    pub fn open_ledger(
        &self,
        student_id: StudentId,
        school_year: &SchoolYear,
        time: &SafeTimeProvider,
    ) -> Result<LedgerSnapshot> {
        let now = time.now();
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let key = LedgerKey::new(student_id, school_year.clone());

        let mut events = Vec::new();
        let snapshot = self.store.transaction(&key, |rows| {
            Self::ensure_record(rows, now, &mut events);
            self.refresh(rows, &fees, now, &mut events)
        })?;

        self.publish(events)?;
        info!(balance = %snapshot.balance, "ledger opened");
        Ok(snapshot)
    }

    /// record a payment against the school year's ledger
    ///
    /// The tendered amount is allocated oldest debt first. One payment of the
    /// applied amount is stored against this year's fee record, with the
    /// share paid to earlier years kept on it as carried-back credit. Change
    /// is never stored.
    #[instrument(
        skip(self, request, time),
        fields(student_id = %request.student_id, school_year = %request.school_year, tendered = %request.tendered)
    )]
    pub fn post_payment(&self, request: PaymentRequest, time: &SafeTimeProvider) -> Result<PaymentReceipt> {
        let now = time.now();
        let validator = PaymentValidator::new(&self.config.payment_policy, now.date_naive());
        validator.validate_request(&request)?;

        let fees = self.resolve_fees(request.student_id, Some(&request.school_year))?;
        let key = LedgerKey::new(request.student_id, request.school_year.clone());

        let mut events = Vec::new();
        let receipt = self.store.transaction(&key, |rows| {
            let before = self.position(rows, &fees)?;
            let outstanding = before.previous_balance + before.snapshot.balance;
            validator.validate_minimum(request.tendered, outstanding)?;

            let allocation =
                PaymentAllocator::allocate(request.tendered, before.previous_balance, before.snapshot.balance)?;
            let applied = allocation.total_applied();
            if !applied.is_positive() {
                warn!(tendered = %request.tendered, "payment rejected, nothing outstanding");
                return Err(LedgerError::NothingOutstanding {
                    tendered: request.tendered,
                });
            }

            let fee_record_id = Self::ensure_record(rows, now, &mut events);
            let payment = PaymentRecord::new(&request, fee_record_id, applied, now)
                .with_carried_back(allocation.previous_paid);
            rows.payments.push(payment.clone());

            let snapshot = self.refresh(rows, &fees, now, &mut events)?;
            events.push(Event::PaymentRecorded {
                payment_id: payment.id,
                student_id: key.student_id,
                school_year: key.school_year.clone(),
                amount: applied,
                applied_to_previous: allocation.previous_paid,
                applied_to_current: allocation.current_paid,
                change: allocation.change,
                timestamp: now,
            });

            Ok(PaymentReceipt {
                payment,
                allocation,
                snapshot,
            })
        })?;

        self.publish(events)?;
        if receipt.payment.carried_back.is_positive() {
            self.refresh_earlier_years(&key, now);
        }
        info!(
            payment_id = %receipt.payment.id,
            amount = %receipt.payment.amount,
            carried_back = %receipt.payment.carried_back,
            change = %receipt.allocation.change,
            balance = %receipt.snapshot.balance,
            "payment recorded"
        );
        Ok(receipt)
    }

    /// correct a recorded payment and recompute its ledger
    #[instrument(skip(self, edit, time), fields(payment_id = %payment_id))]
    pub fn edit_payment(
        &self,
        payment_id: PaymentId,
        edit: PaymentEdit,
        time: &SafeTimeProvider,
    ) -> Result<LedgerSnapshot> {
        let now = time.now();
        let payment = self
            .store
            .payment(payment_id)?
            .ok_or(LedgerError::PaymentNotFound { id: payment_id })?;

        let validator = PaymentValidator::new(&self.config.payment_policy, now.date_naive());
        if let Some(amount) = edit.amount {
            validator.validate_amount(amount)?;
        }
        let reference = match &edit.reference {
            Some(reference) => reference.clone(),
            None => payment.reference.clone(),
        };
        validator.validate_details(
            edit.method.unwrap_or(payment.method),
            reference.as_deref(),
            edit.payment_date.unwrap_or(payment.payment_date),
        )?;

        let key = self.key_for_fee_record(payment.student_fee_id, payment_id)?;
        let fees = self.resolve_fees(key.student_id, Some(&key.school_year))?;

        let mut events = Vec::new();
        let (snapshot, carried_changed) = self.store.transaction(&key, |rows| {
            let stored = rows
                .payments
                .iter_mut()
                .find(|p| p.id == payment_id)
                .ok_or(LedgerError::PaymentNotFound { id: payment_id })?;
            let carried_before = stored.carried_back;
            let old_amount = stored.apply_edit(&edit);
            let new_amount = stored.amount;
            let carried_changed = stored.carried_back != carried_before;

            let snapshot = self.refresh(rows, &fees, now, &mut events)?;
            events.push(Event::PaymentEdited {
                payment_id,
                old_amount,
                new_amount,
                timestamp: now,
            });
            Ok((snapshot, carried_changed))
        })?;

        self.publish(events)?;
        if carried_changed {
            self.refresh_earlier_years(&key, now);
        }
        info!(balance = %snapshot.balance, "payment edited");
        Ok(snapshot)
    }

    /// delete a recorded payment and recompute its ledger
    #[instrument(skip(self, time), fields(payment_id = %payment_id))]
    pub fn delete_payment(&self, payment_id: PaymentId, time: &SafeTimeProvider) -> Result<LedgerSnapshot> {
        let now = time.now();
        let payment = self
            .store
            .payment(payment_id)?
            .ok_or(LedgerError::PaymentNotFound { id: payment_id })?;
        let key = self.key_for_fee_record(payment.student_fee_id, payment_id)?;
        let fees = self.resolve_fees(key.student_id, Some(&key.school_year))?;

        let mut events = Vec::new();
        let (snapshot, removed) = self.store.transaction(&key, |rows| {
            let position = rows
                .payments
                .iter()
                .position(|p| p.id == payment_id)
                .ok_or(LedgerError::PaymentNotFound { id: payment_id })?;
            let removed = rows.payments.remove(position);

            let snapshot = self.refresh(rows, &fees, now, &mut events)?;
            events.push(Event::PaymentDeleted {
                payment_id,
                amount: removed.amount,
                timestamp: now,
            });
            Ok((snapshot, removed))
        })?;

        self.publish(events)?;
        if removed.carried_back.is_positive() {
            self.refresh_earlier_years(&key, now);
        }
        info!(balance = %snapshot.balance, "payment deleted");
        Ok(snapshot)
    }

    /// give a grant to a student for a school year
    #[instrument(skip(self, time), fields(student_id = %student_id, grant_id = %grant_id, school_year = %school_year))]
    pub fn assign_grant(
        &self,
        student_id: StudentId,
        grant_id: GrantId,
        school_year: &SchoolYear,
        time: &SafeTimeProvider,
    ) -> Result<GrantAssignment> {
        let now = time.now();
        self.store
            .grant(grant_id)?
            .ok_or(LedgerError::GrantNotFound { id: grant_id })?;
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let key = LedgerKey::new(student_id, school_year.clone());

        let mut events = Vec::new();
        let assignment = self.store.transaction(&key, |rows| {
            if rows
                .assignments
                .iter()
                .any(|a| a.grant_id == grant_id && a.status.is_active())
            {
                return Err(LedgerError::DuplicateGrantAssignment {
                    grant_id,
                    school_year: school_year.clone(),
                });
            }

            let assignment = GrantAssignment::new(grant_id, student_id, school_year.clone(), now);
            let assignment_id = assignment.id;
            rows.assignments.push(assignment);
            self.recompute_discounts_in(rows, &fees, now, &mut events)?;

            let assigned = rows
                .assignments
                .iter()
                .find(|a| a.id == assignment_id)
                .cloned()
                .ok_or(LedgerError::AssignmentNotFound { id: assignment_id })?;
            events.push(Event::GrantAssigned {
                assignment_id,
                grant_id,
                student_id,
                school_year: school_year.clone(),
                discount_amount: assigned.discount_amount,
                timestamp: now,
            });
            Ok(assigned)
        })?;

        self.publish(events)?;
        info!(discount = %assignment.discount_amount, "grant assigned");
        Ok(assignment)
    }

    /// change an assignment's status; only active assignments discount
    #[instrument(skip(self, time), fields(assignment_id = %assignment_id, status = ?status))]
    pub fn set_grant_status(
        &self,
        assignment_id: AssignmentId,
        status: GrantStatus,
        time: &SafeTimeProvider,
    ) -> Result<GrantAssignment> {
        let now = time.now();
        let existing = self
            .store
            .grant_assignment(assignment_id)?
            .ok_or(LedgerError::AssignmentNotFound { id: assignment_id })?;
        let key = LedgerKey::new(existing.student_id, existing.school_year.clone());
        let fees = self.resolve_fees(key.student_id, Some(&key.school_year))?;

        let mut events = Vec::new();
        let updated = self.store.transaction(&key, |rows| {
            let index = rows
                .assignments
                .iter()
                .position(|a| a.id == assignment_id)
                .ok_or(LedgerError::AssignmentNotFound { id: assignment_id })?;

            let grant_id = rows.assignments[index].grant_id;
            if status.is_active()
                && rows
                    .assignments
                    .iter()
                    .any(|a| a.id != assignment_id && a.grant_id == grant_id && a.status.is_active())
            {
                return Err(LedgerError::DuplicateGrantAssignment {
                    grant_id,
                    school_year: key.school_year.clone(),
                });
            }

            let old_status = rows.assignments[index].status;
            rows.assignments[index].status = status;
            self.recompute_discounts_in(rows, &fees, now, &mut events)?;

            events.push(Event::GrantStatusChanged {
                assignment_id,
                old_status,
                new_status: status,
                timestamp: now,
            });
            Ok(rows.assignments[index].clone())
        })?;

        self.publish(events)?;
        info!("grant status changed");
        Ok(updated)
    }

    /// delete an assignment outright
    #[instrument(skip(self, time), fields(assignment_id = %assignment_id))]
    pub fn remove_grant(&self, assignment_id: AssignmentId, time: &SafeTimeProvider) -> Result<LedgerSnapshot> {
        let now = time.now();
        let existing = self
            .store
            .grant_assignment(assignment_id)?
            .ok_or(LedgerError::AssignmentNotFound { id: assignment_id })?;
        let key = LedgerKey::new(existing.student_id, existing.school_year.clone());
        let fees = self.resolve_fees(key.student_id, Some(&key.school_year))?;

        let mut events = Vec::new();
        let snapshot = self.store.transaction(&key, |rows| {
            let index = rows
                .assignments
                .iter()
                .position(|a| a.id == assignment_id)
                .ok_or(LedgerError::AssignmentNotFound { id: assignment_id })?;
            let removed = rows.assignments.remove(index);

            let snapshot = self.recompute_discounts_in(rows, &fees, now, &mut events)?;
            events.push(Event::GrantRemoved {
                assignment_id,
                grant_id: removed.grant_id,
                timestamp: now,
            });
            Ok(snapshot)
        })?;

        self.publish(events)?;
        info!("grant removed");
        Ok(snapshot)
    }

    /// refresh cached discounts and the stored record, e.g. after fee items change
    #[instrument(skip(self, time), fields(student_id = %student_id, school_year = %school_year))]
    pub fn recompute(
        &self,
        student_id: StudentId,
        school_year: &SchoolYear,
        time: &SafeTimeProvider,
    ) -> Result<LedgerSnapshot> {
        let now = time.now();
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let key = LedgerKey::new(student_id, school_year.clone());

        let mut events = Vec::new();
        let snapshot = self
            .store
            .transaction(&key, |rows| self.recompute_discounts_in(rows, &fees, now, &mut events))?;

        self.publish(events)?;
        Ok(snapshot)
    }

    /// flag a ledger overdue; refused when nothing is owed
    #[instrument(skip(self, time), fields(student_id = %student_id, school_year = %school_year, due_date = %due_date))]
    pub fn mark_overdue(
        &self,
        student_id: StudentId,
        school_year: &SchoolYear,
        due_date: NaiveDate,
        time: &SafeTimeProvider,
    ) -> Result<LedgerSnapshot> {
        let now = time.now();
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let key = LedgerKey::new(student_id, school_year.clone());

        let mut events = Vec::new();
        let snapshot = self.store.transaction(&key, |rows| {
            let balance = self.position(rows, &fees)?.snapshot.balance;
            if !balance.is_positive() {
                warn!(balance = %balance, "refusing to mark settled ledger overdue");
                return Err(LedgerError::OverdueRequiresBalance { balance });
            }

            Self::ensure_record(rows, now, &mut events);
            if let Some(record) = rows.record.as_mut() {
                OverdueManager::mark_overdue(record, balance, due_date, now)?;
            }

            events.push(Event::MarkedOverdue {
                student_id,
                school_year: school_year.clone(),
                balance,
                due_date,
                timestamp: now,
            });
            self.refresh(rows, &fees, now, &mut events)
        })?;

        self.publish(events)?;
        info!("ledger marked overdue");
        Ok(snapshot)
    }

    /// drop the overdue flag; the due date is kept
    #[instrument(skip(self, time), fields(student_id = %student_id, school_year = %school_year))]
    pub fn clear_overdue(
        &self,
        student_id: StudentId,
        school_year: &SchoolYear,
        time: &SafeTimeProvider,
    ) -> Result<LedgerSnapshot> {
        let now = time.now();
        let fees = self.resolve_fees(student_id, Some(school_year))?;
        let key = LedgerKey::new(student_id, school_year.clone());

        let mut events = Vec::new();
        let snapshot = self.store.transaction(&key, |rows| {
            let record = rows.record.as_mut().ok_or(LedgerError::FeeRecordNotFound {
                student_id,
                school_year: school_year.clone(),
            })?;
            OverdueManager::clear_overdue(record, now);

            events.push(Event::OverdueCleared {
                student_id,
                school_year: school_year.clone(),
                timestamp: now,
            });
            self.refresh(rows, &fees, now, &mut events)
        })?;

        self.publish(events)?;
        info!("overdue cleared");
        Ok(snapshot)
    }

    /// mark every matching fee record with an outstanding balance overdue
    ///
    /// Each record commits in its own transaction after a re-check under its
    /// lock; records already overdue or fully paid are skipped. A record that
    /// fails is reported and the run carries on, so the events of every
    /// record marked are always published.
    #[instrument(skip(self, filter, time), fields(school_year = %filter.school_year, due_date = %due_date))]
    pub fn bulk_mark_overdue(
        &self,
        filter: &OverdueFilter,
        due_date: NaiveDate,
        time: &SafeTimeProvider,
    ) -> Result<BulkOverdueReport> {
        let now = time.now();
        let mut report = BulkOverdueReport::default();

        for candidate in self.store.fee_records(&filter.school_year)? {
            match self.mark_candidate(filter, &candidate, due_date, now) {
                Ok(Some(events)) => {
                    self.publish(events)?;
                    report.marked.push(candidate.student_id);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(student_id = %candidate.student_id, error = %error, "record skipped in bulk overdue run");
                    report.failed.push(BulkOverdueFailure {
                        student_id: candidate.student_id,
                        error,
                    });
                }
            }
        }

        self.publish(vec![Event::BulkOverdueMarked {
            school_year: filter.school_year.clone(),
            due_date,
            affected: report.affected(),
            failed: report.failed.len(),
            timestamp: now,
        }])?;
        info!(affected = report.affected(), failed = report.failed.len(), "bulk overdue run finished");
        Ok(report)
    }

    /// events of the marking, or `None` when the record is not eligible
    fn mark_candidate(
        &self,
        filter: &OverdueFilter,
        candidate: &StudentFeeRecord,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Event>>> {
        let scope = self.student_scope(candidate.student_id)?;
        if !filter.matches(&scope) {
            return Ok(None);
        }
        let fees = self.fees_for_scope(&scope, Some(&filter.school_year))?;

        let mut events = Vec::new();
        let marked = self.store.transaction(&candidate.key(), |rows| {
            let balance = self.position(rows, &fees)?.snapshot.balance;
            let eligible = rows
                .record
                .as_ref()
                .map_or(false, |r| OverdueManager::eligible_for_bulk(r, balance));
            if !eligible {
                return Ok(false);
            }

            if let Some(record) = rows.record.as_mut() {
                OverdueManager::mark_overdue(record, balance, due_date, now)?;
            }
            events.push(Event::MarkedOverdue {
                student_id: rows.key.student_id,
                school_year: rows.key.school_year.clone(),
                balance,
                due_date,
                timestamp: now,
            });
            self.refresh(rows, &fees, now, &mut events)?;
            Ok(true)
        })?;

        Ok(marked.then_some(events))
    }
}
