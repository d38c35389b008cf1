use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    AccountId, AccountStatus, LoanId, LoanNumber, LoanStatus, TransactionId, TransactionType,
};

/// all events that can be emitted by the ledger engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanApplied {
        loan_id: LoanId,
        loan_number: LoanNumber,
        principal: Money,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },
    LoanApproved {
        loan_id: LoanId,
        approver: String,
        timestamp: DateTime<Utc>,
    },
    LoanRejected {
        loan_id: LoanId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    LoanDisbursed {
        loan_id: LoanId,
        account_id: AccountId,
        net_amount: Money,
        processing_fee: Money,
        maturity_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    LoanClosed {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    LoanDefaulted {
        loan_id: LoanId,
        outstanding: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    LoanWrittenOff {
        loan_id: LoanId,
        loss_amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // repayment events
    RepaymentAllocated {
        loan_id: LoanId,
        amount: Money,
        applied_to_fees: Money,
        applied_to_interest: Money,
        applied_to_principal: Money,
        installments_touched: Vec<u32>,
        timestamp: DateTime<Utc>,
    },
    InstallmentOverdue {
        loan_id: LoanId,
        installment_number: u32,
        due_date: NaiveDate,
        amount_due: Money,
    },
    LateFeeAssessed {
        loan_id: LoanId,
        installment_number: u32,
        fee_amount: Money,
        days_overdue: u32,
        timestamp: DateTime<Utc>,
    },

    // ledger events
    TransactionPosted {
        transaction_id: TransactionId,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        balance_after: Money,
        timestamp: DateTime<Utc>,
    },
    TransferCompleted {
        debit_id: TransactionId,
        credit_id: TransactionId,
        from: AccountId,
        to: AccountId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    TransactionReversed {
        original_id: TransactionId,
        reversal_id: TransactionId,
        account_id: AccountId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AccountStatusChanged {
        account_id: AccountId,
        old_status: AccountStatus,
        new_status: AccountStatus,
        timestamp: DateTime<Utc>,
    },

    // status change events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// append a batch produced by a completed operation
    pub fn extend(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
