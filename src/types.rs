use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;

/// internal identifier of a loan record
pub type LoanId = Uuid;

/// internal identifier of a ledger posting
pub type TransactionId = Uuid;

/// externally assigned ledger account identifier, also the lock-ordering key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// externally assigned loan number, opaque to the engine
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoanNumber(String);

impl LoanNumber {
    pub fn new(number: impl Into<String>) -> Self {
        LoanNumber(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoanNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// how interest is computed over the tenure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    /// interest on the original principal, spread evenly
    Flat,
    /// interest on the declining outstanding balance
    Reducing,
    /// same linear split as flat
    Fixed,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// application captured with its schedule
    Applied,
    /// application under review
    Pending,
    Approved,
    Rejected,
    /// funds moved, transient before active
    Disbursed,
    /// performing
    Active,
    /// at least one installment past due
    Overdue,
    Defaulted,
    /// fully repaid
    Closed,
    /// written off as loss
    WrittenOff,
}

impl LoanStatus {
    /// terminal states are sinks
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Closed | LoanStatus::WrittenOff)
    }

    /// statuses in which repayments are accepted
    pub fn accepts_repayment(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }
}

/// actions driving the loan state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    Review,
    Approve,
    Reject,
    Disburse,
    Activate,
    Repay,
    MarkOverdue,
    Cure,
    Close,
    Default,
    WriteOff,
    AssessFee,
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Waived,
}

impl ScheduleStatus {
    /// entries a payment may still be applied to
    pub fn is_eligible(&self) -> bool {
        matches!(self, ScheduleStatus::Pending | ScheduleStatus::Partial | ScheduleStatus::Overdue)
    }
}

/// ledger account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    /// accepts credits only
    Dormant,
    Frozen,
    Closed,
}

/// ledger account kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Savings,
    Current,
    /// account a loan is disbursed through and repaid into
    Loan,
}

/// direction of a posting against an account balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Credit => Direction::Debit,
            Direction::Debit => Direction::Credit,
        }
    }

    /// apply the direction to a positive amount
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

/// posting type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    LoanDisbursement,
    LoanRepayment,
    LoanInterest,
    FeeCharge,
    FeeReversal,
    InterestCredit,
    Reversal,
    Adjustment,
}

impl TransactionType {
    /// fixed direction of the type; reversals and adjustments carry their own
    pub fn natural_direction(&self) -> Option<Direction> {
        match self {
            TransactionType::Deposit
            | TransactionType::TransferIn
            | TransactionType::LoanDisbursement
            | TransactionType::FeeReversal
            | TransactionType::InterestCredit => Some(Direction::Credit),
            TransactionType::Withdrawal
            | TransactionType::TransferOut
            | TransactionType::LoanRepayment
            | TransactionType::LoanInterest
            | TransactionType::FeeCharge => Some(Direction::Debit),
            TransactionType::Reversal | TransactionType::Adjustment => None,
        }
    }
}

/// posting status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
}

/// how a payment was split inside the schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentApplication {
    pub to_fees: Money,
    pub to_interest: Money,
    pub to_principal: Money,
}

impl PaymentApplication {
    pub fn total_applied(&self) -> Money {
        self.to_fees + self.to_interest + self.to_principal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(LoanStatus::Closed.is_terminal());
        assert!(LoanStatus::Rejected.is_terminal());
        assert!(LoanStatus::WrittenOff.is_terminal());
        assert!(!LoanStatus::Defaulted.is_terminal());
        assert!(!LoanStatus::Overdue.is_terminal());
    }

    #[test]
    fn test_transaction_directions() {
        assert_eq!(TransactionType::LoanDisbursement.natural_direction(), Some(Direction::Credit));
        assert_eq!(TransactionType::Withdrawal.natural_direction(), Some(Direction::Debit));
        assert_eq!(TransactionType::Reversal.natural_direction(), None);
        assert_eq!(Direction::Debit.signed(Money::from_major(5)), Money::from_major(-5));
    }

    #[test]
    fn test_account_id_ordering() {
        let mut ids = vec![AccountId::new("B-2"), AccountId::new("A-9"), AccountId::new("B-1")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "A-9");
        assert_eq!(ids[2].as_str(), "B-2");
    }
}
