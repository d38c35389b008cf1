use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{AccountKind, InterestType};

/// loan product terms an application is validated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanProduct {
    pub code: String,
    pub name: String,
    pub min_principal: Money,
    pub max_principal: Money,
    pub min_tenure_months: u32,
    pub max_tenure_months: u32,
    pub interest_rate: Rate,
    pub interest_type: InterestType,
    /// percent of principal deducted at disbursement
    pub processing_fee_percentage: Decimal,
    /// flat fee added to an installment once it is past grace
    pub late_fee: Option<Money>,
    #[serde(default)]
    pub grace_period_days: u32,
}

impl LoanProduct {
    /// group-lending working capital for small traders
    pub fn micro_business(rate: Rate) -> Self {
        Self {
            code: "MB".to_string(),
            name: "Micro business".to_string(),
            min_principal: Money::from_major(10_000),
            max_principal: Money::from_major(5_000_000),
            min_tenure_months: 3,
            max_tenure_months: 24,
            interest_rate: rate,
            interest_type: InterestType::Reducing,
            processing_fee_percentage: dec!(1.0),
            late_fee: Some(Money::from_major(500)),
            grace_period_days: 7,
        }
    }

    /// salaried personal loan with flat interest
    pub fn personal(rate: Rate) -> Self {
        Self {
            code: "PL".to_string(),
            name: "Personal".to_string(),
            min_principal: Money::from_major(5_000),
            max_principal: Money::from_major(1_000_000),
            min_tenure_months: 1,
            max_tenure_months: 36,
            interest_rate: rate,
            interest_type: InterestType::Flat,
            processing_fee_percentage: dec!(2.0),
            late_fee: Some(Money::from_major(250)),
            grace_period_days: 5,
        }
    }

    /// short emergency advance, no fee
    pub fn emergency(rate: Rate) -> Self {
        Self {
            code: "EM".to_string(),
            name: "Emergency".to_string(),
            min_principal: Money::from_major(1_000),
            max_principal: Money::from_major(100_000),
            min_tenure_months: 1,
            max_tenure_months: 6,
            interest_rate: rate,
            interest_type: InterestType::Fixed,
            processing_fee_percentage: Decimal::ZERO,
            late_fee: None,
            grace_period_days: 0,
        }
    }

    /// parse and validate a product definition
    pub fn from_json(json: &str) -> Result<Self> {
        let product: LoanProduct =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        product.validate()?;
        Ok(product)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(LedgerError::InvalidConfiguration {
                message: format!("product {}: {}", self.code, message),
            })
        };

        if !self.min_principal.is_positive() || self.min_principal > self.max_principal {
            return invalid("principal bounds must satisfy 0 < min <= max");
        }
        if self.min_tenure_months == 0 || self.min_tenure_months > self.max_tenure_months {
            return invalid("tenure bounds must satisfy 1 <= min <= max");
        }
        if self.interest_rate.is_negative() {
            return invalid("interest rate must not be negative");
        }
        if self.processing_fee_percentage < Decimal::ZERO
            || self.processing_fee_percentage >= Decimal::ONE_HUNDRED
        {
            return invalid("processing fee must be in [0, 100)");
        }
        if matches!(self.late_fee, Some(fee) if !fee.is_positive()) {
            return invalid("late fee must be positive when set");
        }
        Ok(())
    }

    /// OutOfProductRange unless principal and tenure sit inside the bounds
    pub fn check_bounds(&self, principal: Money, tenure_months: u32) -> Result<()> {
        if principal < self.min_principal || principal > self.max_principal {
            return Err(LedgerError::OutOfProductRange {
                field: "principal",
                requested: principal.to_string(),
                min: self.min_principal.to_string(),
                max: self.max_principal.to_string(),
            });
        }
        if tenure_months < self.min_tenure_months || tenure_months > self.max_tenure_months {
            return Err(LedgerError::OutOfProductRange {
                field: "tenure_months",
                requested: tenure_months.to_string(),
                min: self.min_tenure_months.to_string(),
                max: self.max_tenure_months.to_string(),
            });
        }
        Ok(())
    }
}

/// ledger account configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub kind: AccountKind,
    pub currency: String,
    /// how far available balance may go below zero; zero forbids overdraft
    pub overdraft_limit: Money,
}

impl AccountConfig {
    pub fn savings(currency: &str) -> Self {
        Self {
            kind: AccountKind::Savings,
            currency: currency.to_string(),
            overdraft_limit: Money::ZERO,
        }
    }

    pub fn current(currency: &str, overdraft_limit: Money) -> Self {
        Self {
            kind: AccountKind::Current,
            currency: currency.to_string(),
            overdraft_limit,
        }
    }

    pub fn loan_account(currency: &str) -> Self {
        Self {
            kind: AccountKind::Loan,
            currency: currency.to_string(),
            overdraft_limit: Money::ZERO,
        }
    }

    pub fn allows_overdraft(&self) -> bool {
        self.overdraft_limit.is_positive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for product in [
            LoanProduct::micro_business(Rate::from_percentage(24)),
            LoanProduct::personal(Rate::from_percentage(10)),
            LoanProduct::emergency(Rate::ZERO),
        ] {
            assert!(product.validate().is_ok(), "{} invalid", product.code);
        }
    }

    #[test]
    fn test_bounds() {
        let product = LoanProduct::personal(Rate::from_percentage(10));
        assert!(product.check_bounds(Money::from_major(50_000), 5).is_ok());

        let err = product.check_bounds(Money::from_major(4_999), 5).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfProductRange { field: "principal", .. }));

        let err = product.check_bounds(Money::from_major(50_000), 37).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfProductRange { field: "tenure_months", .. }));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "code": "AG",
            "name": "Agri season",
            "min_principal": "1000",
            "max_principal": "200000",
            "min_tenure_months": 3,
            "max_tenure_months": 9,
            "interest_rate": "18",
            "interest_type": "reducing",
            "processing_fee_percentage": "1.5",
            "late_fee": null
        }"#;
        let product = LoanProduct::from_json(json).unwrap();
        assert_eq!(product.interest_type, InterestType::Reducing);
        assert_eq!(product.grace_period_days, 0);
        assert_eq!(product.interest_rate, Rate::from_percentage(18));
    }

    #[test]
    fn test_from_json_rejects_inverted_bounds() {
        let json = r#"{
            "code": "BAD",
            "name": "Bad",
            "min_principal": "5000",
            "max_principal": "1000",
            "min_tenure_months": 1,
            "max_tenure_months": 2,
            "interest_rate": "10",
            "interest_type": "flat",
            "processing_fee_percentage": "0",
            "late_fee": null
        }"#;
        assert!(matches!(
            LoanProduct::from_json(json),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }
}
