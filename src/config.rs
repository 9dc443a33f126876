use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

/// ledger engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub discount_policy: DiscountPolicy,
    #[serde(default)]
    pub status_policy: StatusPolicy,
    #[serde(default)]
    pub payment_policy: PaymentPolicy,
}

/// how grant discounts combine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscountPolicy {
    /// clamp the sum of all active discounts at the fee total
    ///
    /// Off by default: only fixed grants are clamped individually and the
    /// balance clamp absorbs any excess.
    pub cap_total_discount: bool,
}

/// status reported for a ledger with nothing billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroObligationStatus {
    #[default]
    Unpaid,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusPolicy {
    pub zero_obligation: ZeroObligationStatus,
}

/// payment intake rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPolicy {
    /// check, transfer and online payments must carry a reference
    pub require_reference_for_non_cash: bool,
    /// accept payment dates after today
    pub allow_future_dated: bool,
    /// smallest accepted payment unless it settles everything outstanding
    pub minimum_payment: Option<Money>,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            require_reference_for_non_cash: true,
            allow_future_dated: false,
            minimum_payment: None,
        }
    }
}

impl LedgerConfig {
    /// behaviour matching the cashier screens: uncapped discounts, zero
    /// obligation reported as unpaid
    pub fn standard() -> Self {
        Self::default()
    }

    /// capped discounts, explicit not-applicable status and a minimum payment
    pub fn strict(minimum_payment: Money) -> Self {
        Self {
            discount_policy: DiscountPolicy {
                cap_total_discount: true,
            },
            status_policy: StatusPolicy {
                zero_obligation: ZeroObligationStatus::NotApplicable,
            },
            payment_policy: PaymentPolicy {
                require_reference_for_non_cash: true,
                allow_future_dated: false,
                minimum_payment: Some(minimum_payment),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(minimum) = self.payment_policy.minimum_payment {
            if !minimum.is_positive() {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("minimum payment must be positive, got {}", minimum),
                });
            }
        }
        Ok(())
    }

    /// parse and validate a json configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_defaults() {
        let config = LedgerConfig::standard();
        assert!(!config.discount_policy.cap_total_discount);
        assert_eq!(config.status_policy.zero_obligation, ZeroObligationStatus::Unpaid);
        assert!(config.payment_policy.require_reference_for_non_cash);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_and_partial_documents() {
        let strict = LedgerConfig::strict(Money::from_major(500));
        let json = strict.to_json().unwrap();
        assert_eq!(LedgerConfig::from_json(&json).unwrap(), strict);

        // missing sections fall back to defaults
        let partial = LedgerConfig::from_json(r#"{"discount_policy":{"cap_total_discount":true}}"#).unwrap();
        assert!(partial.discount_policy.cap_total_discount);
        assert_eq!(partial.payment_policy, PaymentPolicy::default());
    }

    #[test]
    fn test_rejects_non_positive_minimum() {
        let json = r#"{"payment_policy":{"require_reference_for_non_cash":false,"allow_future_dated":true,"minimum_payment":"0"}}"#;
        assert!(LedgerConfig::from_json(json).is_err());
        assert!(LedgerConfig::from_json("not json").is_err());
    }
}
