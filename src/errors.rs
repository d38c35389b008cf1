use thiserror::Error;

use crate::decimal::Money;
use crate::types::{AccountId, AccountStatus, LoanAction, LoanStatus, TransactionId, TransactionStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("{field} {requested} outside product range [{min}, {max}]")]
    OutOfProductRange {
        field: &'static str,
        requested: String,
        min: String,
        max: String,
    },

    #[error("invalid transition: cannot {action:?} a loan in status {status:?}")]
    InvalidTransition {
        status: LoanStatus,
        action: LoanAction,
    },

    #[error("insufficient funds on {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Money,
        requested: Money,
    },

    #[error("transaction {id} already reversed")]
    AlreadyReversed {
        id: TransactionId,
    },

    #[error("overpayment: payment {payment} exceeds outstanding {outstanding}")]
    OverpaymentExceedsOutstanding {
        payment: Money,
        outstanding: Money,
    },

    #[error("account {account} has non-zero balance {balance}")]
    NonZeroBalance {
        account: AccountId,
        balance: Money,
    },

    #[error("concurrent write on {aggregate}: expected version {expected}, found {found}")]
    AggregateConflict {
        aggregate: String,
        expected: u64,
        found: u64,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: String,
    },

    #[error("account {account} is {status:?}")]
    AccountInactive {
        account: AccountId,
        status: AccountStatus,
    },

    #[error("currency mismatch: {expected} vs {found}")]
    CurrencyMismatch {
        expected: String,
        found: String,
    },

    #[error("transaction not found: {id}")]
    TransactionNotFound {
        id: TransactionId,
    },

    #[error("transaction {id} is {status:?} and cannot be reversed")]
    NotReversible {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: String,
    },

    #[error("account not found: {id}")]
    AccountNotFound {
        id: AccountId,
    },

    #[error("schedule mismatch: {message}")]
    ScheduleMismatch {
        message: String,
    },

    #[error("ledger imbalance on {account}: {message}")]
    LedgerImbalance {
        account: AccountId,
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

impl LedgerError {
    /// only optimistic-lock conflicts are worth retrying, and only from a fresh read
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::AggregateConflict { .. })
    }

    /// errors the end user can fix by changing their request
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            LedgerError::OutOfProductRange { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::OverpaymentExceedsOutstanding { .. }
                | LedgerError::NonZeroBalance { .. }
                | LedgerError::InvalidAmount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
