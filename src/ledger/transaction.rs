use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{AccountId, Direction, LoanId, TransactionId, TransactionStatus, TransactionType};

/// a single ledger posting with its balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// caller-supplied reference, opaque to the ledger
    pub reference: String,
    pub account_id: AccountId,
    pub loan_id: Option<LoanId>,
    pub transaction_type: TransactionType,
    pub direction: Direction,
    /// always positive
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub status: TransactionStatus,
    /// other leg of a transfer, or original <-> reversal. A reversal always points
    /// at its original; a reversed transfer leg keeps pointing at its paired leg, so
    /// find its reversal by searching the book for a reversal naming it.
    pub related_transaction_id: Option<TransactionId>,
    pub narration: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// signed effect on the account balance
    pub fn signed_amount(&self) -> Money {
        self.direction.signed(self.amount)
    }

    /// balance_after = balance_before ± amount, signed the way the type dictates
    pub fn is_consistent(&self) -> bool {
        let direction_matches = self
            .transaction_type
            .natural_direction()
            .map_or(true, |natural| natural == self.direction);
        direction_matches
            && self.amount.is_positive()
            && self.balance_before + self.signed_amount() == self.balance_after
    }

    pub fn is_reversal(&self) -> bool {
        self.transaction_type == TransactionType::Reversal
    }
}

/// optional details attached to a posting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingDetails {
    pub reference: String,
    pub narration: Option<String>,
    pub loan_id: Option<LoanId>,
    /// required for adjustments, which have no natural direction
    pub direction: Option<Direction>,
}

impl PostingDetails {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Self::default()
        }
    }

    pub fn narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    pub fn loan(mut self, loan_id: LoanId) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// request to move money between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Money,
    pub reference: String,
    pub narration: String,
    pub loan_id: Option<LoanId>,
    pub debit_type: TransactionType,
    pub credit_type: TransactionType,
}

impl TransferRequest {
    pub fn new(amount: Money, reference: impl Into<String>, narration: impl Into<String>) -> Self {
        Self {
            amount,
            reference: reference.into(),
            narration: narration.into(),
            loan_id: None,
            debit_type: TransactionType::TransferOut,
            credit_type: TransactionType::TransferIn,
        }
    }

    /// repayment legs: loan_repayment out of the payer, transfer_in to the loan account
    pub fn loan_repayment(
        amount: Money,
        loan_id: LoanId,
        reference: impl Into<String>,
        narration: impl Into<String>,
    ) -> Self {
        Self {
            loan_id: Some(loan_id),
            debit_type: TransactionType::LoanRepayment,
            ..Self::new(amount, reference, narration)
        }
    }
}
