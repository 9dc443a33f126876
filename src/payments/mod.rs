pub mod allocation;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PaymentPolicy;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{FeeRecordId, PaymentId, PaymentMethod, SchoolYear, StudentId};

pub use allocation::{Allocation, DebtBucket, PaymentAllocator, ALLOCATION_ORDER};

/// recorded payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub student_id: StudentId,
    /// `None` for general postings not tied to a school year's ledger
    pub student_fee_id: Option<FeeRecordId>,
    pub payment_date: NaiveDate,
    pub amount: Money,
    /// part of `amount` applied to earlier school years' balances
    #[serde(default)]
    pub carried_back: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

/// cashier's request to record a payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub student_id: StudentId,
    pub school_year: SchoolYear,
    /// cash handed over, before change
    pub tendered: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: String,
}

/// correction to an existing payment; `None` fields are left unchanged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentEdit {
    pub amount: Option<Money>,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<Option<String>>,
}

/// checks payment fields against the intake policy
pub struct PaymentValidator<'a> {
    policy: &'a PaymentPolicy,
    today: NaiveDate,
}

impl<'a> PaymentValidator<'a> {
    pub fn new(policy: &'a PaymentPolicy, today: NaiveDate) -> Self {
        Self { policy, today }
    }

    pub fn validate_amount(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount { amount });
        }
        Ok(())
    }

    /// minimum payment, waived when the amount clears everything outstanding
    pub fn validate_minimum(&self, amount: Money, outstanding: Money) -> Result<()> {
        if let Some(minimum) = self.policy.minimum_payment {
            if amount < minimum && amount < outstanding {
                return Err(LedgerError::PaymentBelowMinimum {
                    minimum,
                    provided: amount,
                });
            }
        }
        Ok(())
    }

    pub fn validate_details(
        &self,
        method: PaymentMethod,
        reference: Option<&str>,
        payment_date: NaiveDate,
    ) -> Result<()> {
        let has_reference = reference.map(|r| !r.trim().is_empty()).unwrap_or(false);
        if self.policy.require_reference_for_non_cash && !method.is_cash() && !has_reference {
            return Err(LedgerError::MissingPaymentReference { method });
        }

        if !self.policy.allow_future_dated && payment_date > self.today {
            return Err(LedgerError::PaymentDateInFuture { date: payment_date });
        }

        Ok(())
    }

    pub fn validate_request(&self, request: &PaymentRequest) -> Result<()> {
        self.validate_amount(request.tendered)?;
        self.validate_details(request.method, request.reference.as_deref(), request.payment_date)
    }
}

impl PaymentRecord {
    pub fn new(
        request: &PaymentRequest,
        student_fee_id: FeeRecordId,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            student_fee_id: Some(student_fee_id),
            payment_date: request.payment_date,
            amount,
            carried_back: Money::ZERO,
            method: request.method,
            reference: request.reference.clone(),
            recorded_by: request.recorded_by.clone(),
            created_at,
        }
    }

    /// mark `carried_back` of the amount as settling earlier school years
    pub fn with_carried_back(mut self, carried_back: Money) -> Self {
        self.carried_back = carried_back.min(self.amount);
        self
    }

    /// share of the amount that stays with the fee record's own year
    pub fn applied_to_year(&self) -> Money {
        (self.amount - self.carried_back).non_negative()
    }

    /// apply an edit in place, returning the previous amount
    ///
    /// A lowered amount shrinks the carried-back share first.
    pub fn apply_edit(&mut self, edit: &PaymentEdit) -> Money {
        let old_amount = self.amount;
        if let Some(amount) = edit.amount {
            self.amount = amount;
            self.carried_back = self.carried_back.min(amount);
        }
        if let Some(date) = edit.payment_date {
            self.payment_date = date;
        }
        if let Some(method) = edit.method {
            self.method = method;
        }
        if let Some(reference) = &edit.reference {
            self.reference = reference.clone();
        }
        old_amount
    }
}

/// own-year total of payments posted against a fee record
pub fn total_paid_against(payments: &[PaymentRecord], fee_record_id: Option<FeeRecordId>) -> Money {
    posted_against(payments, fee_record_id)
        .map(PaymentRecord::applied_to_year)
        .sum()
}

/// credit the payments on a fee record carried back to earlier years
pub fn carried_back_against(payments: &[PaymentRecord], fee_record_id: Option<FeeRecordId>) -> Money {
    posted_against(payments, fee_record_id).map(|p| p.carried_back).sum()
}

fn posted_against(
    payments: &[PaymentRecord],
    fee_record_id: Option<FeeRecordId>,
) -> impl Iterator<Item = &PaymentRecord> {
    payments
        .iter()
        .filter(move |p| fee_record_id.is_some() && p.student_fee_id == fee_record_id)
}
