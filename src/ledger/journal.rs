use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::types::{Direction, TransactionId, TransactionStatus, TransactionType};

use super::{LedgerAccount, PostingDetails, Transaction, TransferRequest};

/// an account together with its posting history, saved as one aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBook {
    pub account: LedgerAccount,
    pub postings: Vec<Transaction>,
}

impl AccountBook {
    pub fn new(account: LedgerAccount) -> Self {
        Self {
            account,
            postings: Vec::new(),
        }
    }

    pub fn find(&self, id: TransactionId) -> Option<&Transaction> {
        self.postings.iter().find(|t| t.id == id)
    }

    /// check the balance against the signed sum of postings and the snapshot chain
    pub fn reconcile(&self) -> Result<()> {
        let mut running = Money::ZERO;
        for posting in &self.postings {
            if !posting.is_consistent() {
                return Err(self.imbalance(format!(
                    "posting {} ({:?} {:?}) does not move {} to {}",
                    posting.id,
                    posting.transaction_type,
                    posting.direction,
                    posting.balance_before,
                    posting.balance_after
                )));
            }
            if posting.balance_before != running {
                return Err(self.imbalance(format!(
                    "posting {} starts at {} but previous balance was {}",
                    posting.id, posting.balance_before, running
                )));
            }
            running = posting.balance_after;
        }

        if running != self.account.balance || running != self.account.ledger_balance {
            return Err(self.imbalance(format!(
                "postings sum to {} but account holds {}",
                running, self.account.balance
            )));
        }
        Ok(())
    }

    fn imbalance(&self, message: String) -> LedgerError {
        LedgerError::LedgerImbalance {
            account: self.account.id.clone(),
            message,
        }
    }
}

/// records postings, transfers and reversals against account books
#[derive(Debug, Default)]
pub struct TransactionJournal {
    events: EventStore,
}

impl TransactionJournal {
    pub fn new() -> Self {
        Self {
            events: EventStore::new(),
        }
    }

    /// post a single leg; the account and its history change together or not at all
    pub fn post(
        &mut self,
        book: &mut AccountBook,
        transaction_type: TransactionType,
        amount: Money,
        details: PostingDetails,
        time: &SafeTimeProvider,
    ) -> Result<Transaction> {
        ensure_posting_amount(amount)?;
        let direction = resolve_direction(transaction_type, details.direction)?;

        let updated = book.account.apply_delta(direction.signed(amount)).map_err(|e| {
            warn!(account = %book.account.id, ?transaction_type, %amount, error = %e, "posting rejected");
            e
        })?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            reference: details.reference,
            account_id: book.account.id.clone(),
            loan_id: details.loan_id,
            transaction_type,
            direction,
            amount,
            balance_before: book.account.balance,
            balance_after: updated.balance,
            status: TransactionStatus::Completed,
            related_transaction_id: None,
            narration: details.narration,
            posted_at: time.now(),
            reversed_at: None,
        };

        book.account = updated;
        book.postings.push(transaction.clone());

        info!(
            account = %transaction.account_id,
            ?transaction_type,
            %amount,
            balance_after = %transaction.balance_after,
            "transaction posted"
        );
        self.emit_posted(&transaction);
        Ok(transaction)
    }

    /// move money between two accounts as a linked debit/credit pair
    pub fn transfer(
        &mut self,
        from: &mut AccountBook,
        to: &mut AccountBook,
        request: TransferRequest,
        time: &SafeTimeProvider,
    ) -> Result<(Transaction, Transaction)> {
        ensure_posting_amount(request.amount)?;
        let debit_direction = resolve_direction(request.debit_type, Some(Direction::Debit))?;
        let credit_direction = resolve_direction(request.credit_type, Some(Direction::Credit))?;

        if from.account.id == to.account.id {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("transfer from {} to itself", from.account.id),
            });
        }
        if from.account.currency() != to.account.currency() {
            return Err(LedgerError::CurrencyMismatch {
                expected: from.account.currency().to_string(),
                found: to.account.currency().to_string(),
            });
        }

        // both legs are computed before either book changes
        let debited = from.account.apply_delta(-request.amount).map_err(|e| {
            warn!(from = %from.account.id, to = %to.account.id, amount = %request.amount, error = %e, "transfer rejected");
            e
        })?;
        let credited = to.account.apply_delta(request.amount)?;

        let now = time.now();
        let debit_id = Uuid::new_v4();
        let credit_id = Uuid::new_v4();

        let debit = Transaction {
            id: debit_id,
            reference: request.reference.clone(),
            account_id: from.account.id.clone(),
            loan_id: request.loan_id,
            transaction_type: request.debit_type,
            direction: debit_direction,
            amount: request.amount,
            balance_before: from.account.balance,
            balance_after: debited.balance,
            status: TransactionStatus::Completed,
            related_transaction_id: Some(credit_id),
            narration: Some(request.narration.clone()),
            posted_at: now,
            reversed_at: None,
        };
        let credit = Transaction {
            id: credit_id,
            reference: request.reference,
            account_id: to.account.id.clone(),
            loan_id: request.loan_id,
            transaction_type: request.credit_type,
            direction: credit_direction,
            amount: request.amount,
            balance_before: to.account.balance,
            balance_after: credited.balance,
            status: TransactionStatus::Completed,
            related_transaction_id: Some(debit_id),
            narration: Some(request.narration),
            posted_at: now,
            reversed_at: None,
        };

        from.account = debited;
        from.postings.push(debit.clone());
        to.account = credited;
        to.postings.push(credit.clone());

        info!(
            from = %debit.account_id,
            to = %credit.account_id,
            amount = %debit.amount,
            "transfer completed"
        );
        self.emit_posted(&debit);
        self.emit_posted(&credit);
        self.events.emit(Event::TransferCompleted {
            debit_id,
            credit_id,
            from: debit.account_id.clone(),
            to: credit.account_id.clone(),
            amount: debit.amount,
            timestamp: now,
        });
        Ok((debit, credit))
    }

    /// undo a completed posting with an equal and opposite reversal
    pub fn reverse(
        &mut self,
        book: &mut AccountBook,
        transaction_id: TransactionId,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Transaction> {
        let index = book
            .postings
            .iter()
            .position(|t| t.id == transaction_id)
            .ok_or(LedgerError::TransactionNotFound { id: transaction_id })?;
        let original = &book.postings[index];

        match original.status {
            TransactionStatus::Reversed => {
                warn!(transaction = %transaction_id, "reversal attempted twice");
                return Err(LedgerError::AlreadyReversed { id: transaction_id });
            }
            TransactionStatus::Completed if !original.is_reversal() => {}
            status => {
                return Err(LedgerError::NotReversible {
                    id: transaction_id,
                    status,
                })
            }
        }

        let direction = original.direction.opposite();
        let updated = book.account.apply_delta(direction.signed(original.amount))?;
        let now = time.now();

        let reversal = Transaction {
            id: Uuid::new_v4(),
            reference: original.reference.clone(),
            account_id: book.account.id.clone(),
            loan_id: original.loan_id,
            transaction_type: TransactionType::Reversal,
            direction,
            amount: original.amount,
            balance_before: book.account.balance,
            balance_after: updated.balance,
            status: TransactionStatus::Completed,
            related_transaction_id: Some(transaction_id),
            narration: Some(reason.to_string()),
            posted_at: now,
            reversed_at: None,
        };

        let original = &mut book.postings[index];
        original.status = TransactionStatus::Reversed;
        original.reversed_at = Some(now);
        if original.related_transaction_id.is_none() {
            original.related_transaction_id = Some(reversal.id);
        }
        book.account = updated;
        book.postings.push(reversal.clone());

        info!(
            account = %reversal.account_id,
            original = %transaction_id,
            amount = %reversal.amount,
            reason,
            "transaction reversed"
        );
        self.emit_posted(&reversal);
        self.events.emit(Event::TransactionReversed {
            original_id: transaction_id,
            reversal_id: reversal.id,
            account_id: reversal.account_id.clone(),
            reason: reason.to_string(),
            timestamp: now,
        });
        Ok(reversal)
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn emit_posted(&mut self, transaction: &Transaction) {
        self.events.emit(Event::TransactionPosted {
            transaction_id: transaction.id,
            account_id: transaction.account_id.clone(),
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            balance_after: transaction.balance_after,
            timestamp: transaction.posted_at,
        });
    }
}

fn ensure_posting_amount(amount: Money) -> Result<()> {
    if !amount.is_positive() || Money::from_decimal_exact(amount.as_decimal()).is_none() {
        return Err(LedgerError::InvalidAmount {
            amount: amount.as_decimal().to_string(),
        });
    }
    Ok(())
}

fn resolve_direction(
    transaction_type: TransactionType,
    explicit: Option<Direction>,
) -> Result<Direction> {
    match (transaction_type.natural_direction(), explicit) {
        (Some(natural), None) => Ok(natural),
        (Some(natural), Some(given)) if natural == given => Ok(natural),
        (None, Some(given)) if transaction_type == TransactionType::Adjustment => Ok(given),
        _ => Err(LedgerError::InvalidConfiguration {
            message: format!("{:?} cannot be posted with direction {:?}", transaction_type, explicit),
        }),
    }
}
