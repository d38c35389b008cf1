use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AccountConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{AccountId, AccountStatus};

/// monetary account mutated only through journal postings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: AccountId,
    pub customer_id: Option<String>,
    pub config: AccountConfig,
    pub balance: Money,
    /// balance less holds
    pub available_balance: Money,
    /// balance of completed postings
    pub ledger_balance: Money,
    pub held_amount: Money,
    pub status: AccountStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl LedgerAccount {
    pub fn open(
        id: AccountId,
        customer_id: Option<String>,
        config: AccountConfig,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            config,
            balance: Money::ZERO,
            available_balance: Money::ZERO,
            ledger_balance: Money::ZERO,
            held_amount: Money::ZERO,
            status: AccountStatus::Active,
            opened_at,
            closed_at: None,
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    /// what a debit may consume, overdraft included
    pub fn spendable(&self) -> Money {
        if self.config.allows_overdraft() {
            self.available_balance + self.config.overdraft_limit
        } else {
            self.available_balance
        }
    }

    /// the account after a signed balance change; self is never modified
    pub fn apply_delta(&self, signed_amount: Money) -> Result<LedgerAccount> {
        self.ensure_can_post(signed_amount)?;

        if signed_amount.is_negative() && self.spendable() + signed_amount < Money::ZERO {
            return Err(LedgerError::InsufficientFunds {
                account: self.id.clone(),
                available: self.available_balance,
                requested: signed_amount.abs(),
            });
        }

        let mut updated = self.clone();
        updated.balance += signed_amount;
        updated.available_balance += signed_amount;
        updated.ledger_balance += signed_amount;
        Ok(updated)
    }

    /// frozen and closed accounts take nothing; dormant ones take credits only
    fn ensure_can_post(&self, signed_amount: Money) -> Result<()> {
        let blocked = match self.status {
            AccountStatus::Active => false,
            AccountStatus::Dormant => signed_amount.is_negative(),
            AccountStatus::Frozen | AccountStatus::Closed => true,
        };
        if blocked {
            return Err(LedgerError::AccountInactive {
                account: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// reserve funds without moving them
    pub fn place_hold(&mut self, amount: Money) -> Result<()> {
        self.ensure_can_post(-amount)?;
        if amount > self.available_balance {
            return Err(LedgerError::InsufficientFunds {
                account: self.id.clone(),
                available: self.available_balance,
                requested: amount,
            });
        }
        self.held_amount += amount;
        self.available_balance -= amount;
        Ok(())
    }

    pub fn release_hold(&mut self, amount: Money) -> Result<()> {
        if amount > self.held_amount || amount.is_negative() {
            return Err(LedgerError::InvalidAmount {
                amount: amount.to_string(),
            });
        }
        self.held_amount -= amount;
        self.available_balance += amount;
        Ok(())
    }

    pub fn freeze(&mut self) -> Result<AccountStatus> {
        self.transition(&[AccountStatus::Active, AccountStatus::Dormant], AccountStatus::Frozen)
    }

    pub fn unfreeze(&mut self) -> Result<AccountStatus> {
        self.transition(&[AccountStatus::Frozen], AccountStatus::Active)
    }

    pub fn mark_dormant(&mut self) -> Result<AccountStatus> {
        self.transition(&[AccountStatus::Active], AccountStatus::Dormant)
    }

    pub fn reactivate(&mut self) -> Result<AccountStatus> {
        self.transition(&[AccountStatus::Dormant], AccountStatus::Active)
    }

    /// close only when balance is zero within rounding tolerance and nothing is held
    pub fn close(&mut self, closed_at: DateTime<Utc>) -> Result<AccountStatus> {
        if !self.balance.approx_eq(Money::ZERO) || !self.held_amount.is_zero() {
            return Err(LedgerError::NonZeroBalance {
                account: self.id.clone(),
                balance: self.balance,
            });
        }
        let old = self.transition(
            &[AccountStatus::Active, AccountStatus::Dormant, AccountStatus::Frozen],
            AccountStatus::Closed,
        )?;
        self.closed_at = Some(closed_at);
        Ok(old)
    }

    fn transition(&mut self, from: &[AccountStatus], to: AccountStatus) -> Result<AccountStatus> {
        if !from.contains(&self.status) {
            return Err(LedgerError::AccountInactive {
                account: self.id.clone(),
                status: self.status,
            });
        }
        let old = self.status;
        self.status = to;
        Ok(old)
    }

    /// balances agree when nothing is held
    pub fn is_settled(&self) -> bool {
        self.held_amount.is_zero()
            && self.balance == self.available_balance
            && self.balance == self.ledger_balance
    }

    pub fn aggregate_key(&self) -> String {
        format!("account:{}", self.id)
    }
}
