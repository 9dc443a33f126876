use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::fees::FeeResolution;
use crate::grants::{GrantAssignment, GrantCalculator};
use crate::ledger::status::{StatusInputs, StatusRules};
use crate::ledger::LedgerSnapshot;
use crate::payments::{total_paid_against, PaymentRecord};
use crate::state::{LedgerKey, StudentFeeRecord};

/// combines fees, grants and payments into a ledger snapshot
///
/// Nothing here trusts the cached figures on a persisted record; only the
/// overdue flag and due date are read from it.
#[derive(Debug, Clone)]
pub struct LedgerAggregator {
    rules: StatusRules,
    cap_total_discount: bool,
}

impl LedgerAggregator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            rules: StatusRules::for_policy(config.status_policy.zero_obligation),
            cap_total_discount: config.discount_policy.cap_total_discount,
        }
    }

    pub fn rules(&self) -> &StatusRules {
        &self.rules
    }

    pub fn grant_discount(&self, total_amount: Money, assignments: &[GrantAssignment]) -> Money {
        let discount = GrantCalculator::total_discount(assignments);
        if self.cap_total_discount {
            discount.min(total_amount)
        } else {
            discount
        }
    }

    /// snapshot from the year's own rows only
    pub fn aggregate(
        &self,
        key: &LedgerKey,
        fees: &FeeResolution,
        assignments: &[GrantAssignment],
        payments: &[PaymentRecord],
        record: Option<&StudentFeeRecord>,
    ) -> LedgerSnapshot {
        self.aggregate_with_credit(key, fees, assignments, payments, record, Money::ZERO)
    }

    /// snapshot counting `carried_in`, credit later years' payments settled here
    pub fn aggregate_with_credit(
        &self,
        key: &LedgerKey,
        fees: &FeeResolution,
        assignments: &[GrantAssignment],
        payments: &[PaymentRecord],
        record: Option<&StudentFeeRecord>,
        carried_in: Money,
    ) -> LedgerSnapshot {
        let total_amount = fees.total;
        let grant_discount = self.grant_discount(total_amount, assignments);

        let fee_record_id = record.map(|r| r.id);
        let total_paid = total_paid_against(payments, fee_record_id) + carried_in;
        let payment_count = payments
            .iter()
            .filter(|p| fee_record_id.is_some() && p.student_fee_id == fee_record_id)
            .count();

        let balance = (total_amount - grant_discount - total_paid).non_negative();
        let is_overdue = record.map(|r| r.is_overdue).unwrap_or(false);

        let status = self.rules.evaluate(&StatusInputs {
            total_amount,
            total_paid,
            balance,
            is_overdue,
        });

        LedgerSnapshot {
            student_id: key.student_id,
            school_year: key.school_year.clone(),
            total_amount,
            grant_discount,
            total_paid,
            balance,
            status,
            is_overdue,
            due_date: record.and_then(|r| r.due_date),
            fee_record_id,
            payment_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscountPolicy, StatusPolicy, ZeroObligationStatus};
    use crate::fees::FeeItem;
    use crate::payments::PaymentRequest;
    use crate::types::{GrantStatus, PaymentMethod, PaymentStatus, SchoolYear};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn key() -> LedgerKey {
        LedgerKey::new(Uuid::new_v4(), SchoolYear::new(2024))
    }

    fn fees(total: i64) -> FeeResolution {
        let item = FeeItem::for_all("Tuition", SchoolYear::new(2024), Money::from_major(total));
        FeeResolution {
            items: vec![item],
            total: Money::from_major(total),
            cost_total: Money::ZERO,
        }
    }

    fn grant(key: &LedgerKey, discount: i64, status: GrantStatus) -> GrantAssignment {
        let mut assignment = GrantAssignment::new(Uuid::new_v4(), key.student_id, key.school_year.clone(), Utc::now());
        assignment.discount_amount = Money::from_major(discount);
        assignment.status = status;
        assignment
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
    fn test_balance_nets_discount_and_payments() {
        let key = key();
        let record = StudentFeeRecord::new(&key, Utc::now());
        let aggregator = LedgerAggregator::new(&LedgerConfig::standard());

        let snapshot = aggregator.aggregate(
            &key,
            &fees(10_000),
            &[grant(&key, 2_000, GrantStatus::Active), grant(&key, 9_999, GrantStatus::Withdrawn)],
            &[payment(&key, &record, 3_000)],
            Some(&record),
        );

        assert_eq!(snapshot.total_amount, Money::from_major(10_000));
        assert_eq!(snapshot.grant_discount, Money::from_major(2_000));
        assert_eq!(snapshot.total_paid, Money::from_major(3_000));
        assert_eq!(snapshot.balance, Money::from_major(5_000));
        assert_eq!(snapshot.status, PaymentStatus::Partial);
        assert_eq!(snapshot.payment_count, 1);
    }

    #[test]
    fn test_balance_never_negative() {
        let key = key();
        let record = StudentFeeRecord::new(&key, Utc::now());
        let aggregator = LedgerAggregator::new(&LedgerConfig::standard());

        let snapshot = aggregator.aggregate(
            &key,
            &fees(1_000),
            &[grant(&key, 800, GrantStatus::Active)],
            &[payment(&key, &record, 900)],
            Some(&record),
        );

        assert_eq!(snapshot.balance, Money::ZERO);
        assert_eq!(snapshot.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_payments_without_record_not_counted() {
        let key = key();
        let elsewhere = StudentFeeRecord::new(&key, Utc::now());
        let aggregator = LedgerAggregator::new(&LedgerConfig::standard());

        let snapshot = aggregator.aggregate(&key, &fees(1_000), &[], &[payment(&key, &elsewhere, 500)], None);

        assert_eq!(snapshot.total_paid, Money::ZERO);
        assert_eq!(snapshot.balance, Money::from_major(1_000));
        assert_eq!(snapshot.status, PaymentStatus::Unpaid);
        assert_eq!(snapshot.fee_record_id, None);
    }

    #[test]
    fn test_carried_credit_counts_as_paid() {
        let key = key();
        let record = StudentFeeRecord::new(&key, Utc::now());
        let aggregator = LedgerAggregator::new(&LedgerConfig::standard());

        let snapshot = aggregator.aggregate_with_credit(&key, &fees(100), &[], &[], Some(&record), Money::from_major(100));

        assert_eq!(snapshot.total_paid, Money::from_major(100));
        assert_eq!(snapshot.balance, Money::ZERO);
        assert_eq!(snapshot.status, PaymentStatus::Paid);
        assert_eq!(snapshot.payment_count, 0);
    }

    #[test]
    fn test_overdue_flag_read_from_record() {
        let key = key();
        let mut record = StudentFeeRecord::new(&key, Utc::now());
        record.is_overdue = true;
        record.due_date = NaiveDate::from_ymd_opt(2024, 10, 1);
        let aggregator = LedgerAggregator::new(&LedgerConfig::standard());

        let paid_up = payment(&key, &record, 1_000);
        let snapshot = aggregator.aggregate(&key, &fees(1_000), &[], &[paid_up], Some(&record));

        assert_eq!(snapshot.balance, Money::ZERO);
        assert_eq!(snapshot.status, PaymentStatus::Overdue);
        assert_eq!(snapshot.due_date, NaiveDate::from_ymd_opt(2024, 10, 1));
    }

    #[test]
    fn test_zero_obligation() {
        let key = key();
        let standard = LedgerAggregator::new(&LedgerConfig::standard());
        let snapshot = standard.aggregate(&key, &FeeResolution::default(), &[], &[], None);
        assert_eq!(snapshot.status, PaymentStatus::Unpaid);

        let config = LedgerConfig {
            status_policy: StatusPolicy {
                zero_obligation: ZeroObligationStatus::NotApplicable,
            },
            ..LedgerConfig::default()
        };
        let explicit = LedgerAggregator::new(&config);
        let snapshot = explicit.aggregate(&key, &FeeResolution::default(), &[], &[], None);
        assert_eq!(snapshot.status, PaymentStatus::NotApplicable);
    }

    #[test]
    fn test_discount_cap_is_optional() {
        let key = key();
        let grants = [grant(&key, 700, GrantStatus::Active), grant(&key, 600, GrantStatus::Active)];

        let uncapped = LedgerAggregator::new(&LedgerConfig::standard());
        let snapshot = uncapped.aggregate(&key, &fees(1_000), &grants, &[], None);
        assert_eq!(snapshot.grant_discount, Money::from_major(1_300));
        assert_eq!(snapshot.balance, Money::ZERO);

        let config = LedgerConfig {
            discount_policy: DiscountPolicy {
                cap_total_discount: true,
            },
            ..LedgerConfig::default()
        };
        let capped = LedgerAggregator::new(&config);
        let snapshot = capped.aggregate(&key, &fees(1_000), &grants, &[], None);
        assert_eq!(snapshot.grant_discount, Money::from_major(1_000));
    }
}
