use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    AssignmentId, FeeRecordId, GrantId, GrantStatus, PaymentId, SchoolYear, StudentId,
};

/// all events emitted by ledger mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // ledger row events
    FeeRecordCreated {
        fee_record_id: FeeRecordId,
        student_id: StudentId,
        school_year: SchoolYear,
        timestamp: DateTime<Utc>,
    },
    LedgerRecomputed {
        student_id: StudentId,
        school_year: SchoolYear,
        total_amount: Money,
        grant_discount: Money,
        total_paid: Money,
        balance: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        payment_id: PaymentId,
        student_id: StudentId,
        school_year: SchoolYear,
        amount: Money,
        applied_to_previous: Money,
        applied_to_current: Money,
        change: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentEdited {
        payment_id: PaymentId,
        old_amount: Money,
        new_amount: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentDeleted {
        payment_id: PaymentId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // grant events
    GrantAssigned {
        assignment_id: AssignmentId,
        grant_id: GrantId,
        student_id: StudentId,
        school_year: SchoolYear,
        discount_amount: Money,
        timestamp: DateTime<Utc>,
    },
    GrantStatusChanged {
        assignment_id: AssignmentId,
        old_status: GrantStatus,
        new_status: GrantStatus,
        timestamp: DateTime<Utc>,
    },
    GrantRemoved {
        assignment_id: AssignmentId,
        grant_id: GrantId,
        timestamp: DateTime<Utc>,
    },
    DiscountsRecomputed {
        student_id: StudentId,
        school_year: SchoolYear,
        total_discount: Money,
        timestamp: DateTime<Utc>,
    },

    // overdue events
    MarkedOverdue {
        student_id: StudentId,
        school_year: SchoolYear,
        balance: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    OverdueCleared {
        student_id: StudentId,
        school_year: SchoolYear,
        timestamp: DateTime<Utc>,
    },
    BulkOverdueMarked {
        school_year: SchoolYear,
        due_date: NaiveDate,
        affected: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// events published by committed operations, held until drained
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
