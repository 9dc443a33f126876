//! serializable statement of a student's ledger
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::fees::FeeResolution;
use crate::grants::{Grant, GrantAssignment};
use crate::ledger::LedgerSnapshot;
use crate::payments::PaymentRecord;
use crate::types::{
    AssignmentId, FeeItemId, GrantId, GrantStatus, GrantType, PaymentId, PaymentMethod,
};

/// everything a cashier window shows for one student and school year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatement {
    pub summary: LedgerSnapshot,
    /// unpaid balance carried from earlier school years
    pub previous_balance: Money,
    pub total_due: Money,
    pub fees: Vec<FeeLine>,
    pub grants: Vec<GrantLine>,
    pub payments: Vec<PaymentLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub fee_item_id: FeeItemId,
    pub name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantLine {
    pub assignment_id: AssignmentId,
    pub grant_id: GrantId,
    /// empty when the grant has since been deleted
    pub name: String,
    pub grant_type: Option<GrantType>,
    pub status: GrantStatus,
    pub discount_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub payment_id: PaymentId,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: String,
}

impl LedgerStatement {
    pub fn build(
        summary: LedgerSnapshot,
        previous_balance: Money,
        fees: &FeeResolution,
        assignments: &[GrantAssignment],
        grants: &HashMap<GrantId, Grant>,
        payments: &[PaymentRecord],
    ) -> Self {
        let fee_lines = fees
            .items
            .iter()
            .map(|item| FeeLine {
                fee_item_id: item.id,
                name: item.name.clone(),
                amount: item.selling_price,
            })
            .collect();

        let grant_lines = assignments
            .iter()
            .map(|assignment| {
                let grant = grants.get(&assignment.grant_id);
                GrantLine {
                    assignment_id: assignment.id,
                    grant_id: assignment.grant_id,
                    name: grant.map(|g| g.name.clone()).unwrap_or_default(),
                    grant_type: grant.map(|g| g.grant_type),
                    status: assignment.status,
                    discount_amount: assignment.discount_amount,
                }
            })
            .collect();

        let mut payment_lines: Vec<PaymentLine> = payments
            .iter()
            .filter(|p| summary.fee_record_id.is_some() && p.student_fee_id == summary.fee_record_id)
            .map(|p| PaymentLine {
                payment_id: p.id,
                payment_date: p.payment_date,
                amount: p.amount,
                method: p.method,
                reference: p.reference.clone(),
                recorded_by: p.recorded_by.clone(),
            })
            .collect();
        payment_lines.sort_by_key(|line| line.payment_date);

        LedgerStatement {
            total_due: previous_balance + summary.balance,
            summary,
            previous_balance,
            fees: fee_lines,
            grants: grant_lines,
            payments: payment_lines,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
