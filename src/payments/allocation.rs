use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

/// debt buckets a tendered amount is split across
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DebtBucket {
    /// unpaid balance carried from earlier school years
    Previous = 1,
    /// balance of the school year being paid
    Current = 2,
}

/// oldest debt first
pub const ALLOCATION_ORDER: [DebtBucket; 2] = [DebtBucket::Previous, DebtBucket::Current];

/// how a tendered amount is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Allocation {
    pub tendered: Money,
    pub previous_paid: Money,
    pub current_paid: Money,
    pub remaining_previous: Money,
    pub remaining_current: Money,
    /// handed back to the payer, applied nowhere
    pub change: Money,
}

impl Allocation {
    pub fn total_applied(&self) -> Money {
        self.previous_paid + self.current_paid
    }

    pub fn remaining_total(&self) -> Money {
        self.remaining_previous + self.remaining_current
    }
}

/// splits cash across outstanding debt in strict priority order
pub struct PaymentAllocator;

impl PaymentAllocator {
    /// allocate `tendered` to the previous balance, then the current balance;
    /// whatever is left is change
    pub fn allocate(tendered: Money, previous_balance: Money, current_balance: Money) -> Result<Allocation> {
        for amount in [tendered, previous_balance, current_balance] {
            if amount.is_negative() {
                return Err(LedgerError::InvalidPaymentAmount { amount });
            }
        }

        let mut remaining = tendered;
        let mut allocation = Allocation {
            tendered,
            remaining_previous: previous_balance,
            remaining_current: current_balance,
            ..Allocation::default()
        };

        for bucket in ALLOCATION_ORDER {
            remaining = Self::apply_to_bucket(bucket, remaining, &mut allocation);
        }

        allocation.change = remaining;
        Ok(allocation)
    }

    fn apply_to_bucket(bucket: DebtBucket, available: Money, allocation: &mut Allocation) -> Money {
        let (outstanding, paid) = match bucket {
            DebtBucket::Previous => (&mut allocation.remaining_previous, &mut allocation.previous_paid),
            DebtBucket::Current => (&mut allocation.remaining_current, &mut allocation.current_paid),
        };

        let payment = available.min(*outstanding);
        *outstanding -= payment;
        *paid = payment;

        available - payment
    }
}
