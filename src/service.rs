use std::collections::HashMap;
use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{AccountConfig, LoanProduct};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountBook, LedgerAccount, PostingDetails, Transaction, TransactionJournal, TransferRequest};
use crate::lending::{Loan, LoanApplication, LoanLifecycle};
use crate::payments::AllocationResult;
use crate::store::{Changeset, LedgerStore, Versioned};
use crate::types::{AccountId, AccountStatus, LoanNumber, TransactionId, TransactionType};

/// hosts lifecycle and journal operations over a store: lock, load, transition, save
pub struct LendingDesk<S> {
    store: S,
    locks: AggregateLocks,
    events: Mutex<EventStore>,
}

impl<S: LedgerStore> LendingDesk<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: AggregateLocks::default(),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn loan(&self, number: &LoanNumber) -> Result<Loan> {
        Ok(self.store.load_loan(number)?.value)
    }

    pub fn account(&self, id: &AccountId) -> Result<AccountBook> {
        Ok(self.store.load_account(id)?.value)
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }

    // accounts

    pub fn open_account(
        &self,
        id: AccountId,
        customer_id: Option<String>,
        config: AccountConfig,
        time: &SafeTimeProvider,
    ) -> Result<AccountBook> {
        let book = AccountBook::new(LedgerAccount::open(id, customer_id, config, time.now()));
        self.store.save_account(Versioned::new(book.clone()))?;
        info!(account = %book.account.id, kind = ?book.account.config.kind, "account opened");
        Ok(book)
    }

    /// single-leg posting against one account
    pub fn post(
        &self,
        account: &AccountId,
        transaction_type: TransactionType,
        amount: Money,
        details: PostingDetails,
        time: &SafeTimeProvider,
    ) -> Result<Transaction> {
        self.locked(vec![account_key(account)], || {
            let mut book = self.store.load_account(account)?;
            let mut journal = TransactionJournal::new();
            let posted = journal.post(&mut book.value, transaction_type, amount, details, time)?;
            self.store.save_account(book)?;
            self.publish(journal.take_events());
            Ok(posted)
        })
    }

    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        request: TransferRequest,
        time: &SafeTimeProvider,
    ) -> Result<(Transaction, Transaction)> {
        if from == to {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("transfer from {} to itself", from),
            });
        }
        self.locked(vec![account_key(from), account_key(to)], || {
            let mut source = self.store.load_account(from)?;
            let mut target = self.store.load_account(to)?;
            let mut journal = TransactionJournal::new();
            let legs = journal.transfer(&mut source.value, &mut target.value, request, time)?;
            self.store.commit(Changeset::new().account(source).account(target))?;
            self.publish(journal.take_events());
            Ok(legs)
        })
    }

    pub fn reverse(
        &self,
        account: &AccountId,
        transaction_id: TransactionId,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Transaction> {
        self.locked(vec![account_key(account)], || {
            let mut book = self.store.load_account(account)?;
            let mut journal = TransactionJournal::new();
            let reversal = journal.reverse(&mut book.value, transaction_id, reason, time)?;
            self.store.save_account(book)?;
            self.publish(journal.take_events());
            Ok(reversal)
        })
    }

    pub fn freeze_account(&self, id: &AccountId, time: &SafeTimeProvider) -> Result<()> {
        self.change_account_status(id, time, |a| a.freeze())
    }

    pub fn unfreeze_account(&self, id: &AccountId, time: &SafeTimeProvider) -> Result<()> {
        self.change_account_status(id, time, |a| a.unfreeze())
    }

    pub fn mark_dormant(&self, id: &AccountId, time: &SafeTimeProvider) -> Result<()> {
        self.change_account_status(id, time, |a| a.mark_dormant())
    }

    pub fn reactivate_account(&self, id: &AccountId, time: &SafeTimeProvider) -> Result<()> {
        self.change_account_status(id, time, |a| a.reactivate())
    }

    pub fn close_account(&self, id: &AccountId, time: &SafeTimeProvider) -> Result<()> {
        let now = time.now();
        self.change_account_status(id, time, move |a| a.close(now))
    }

    // loans

    pub fn apply_for_loan(
        &self,
        application: LoanApplication,
        product: &LoanProduct,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        self.store.load_account(&application.account_id)?;
        let mut lifecycle = LoanLifecycle::new();
        let loan = lifecycle.apply(application, product, time)?;
        self.store.save_loan(Versioned::new(loan.clone()))?;
        self.publish(lifecycle.take_events());
        Ok(loan)
    }

    pub fn submit_for_review(&self, number: &LoanNumber, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| lifecycle.submit_for_review(loan, time))
    }

    pub fn approve_loan(&self, number: &LoanNumber, approver: &str, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| lifecycle.approve(loan, approver, time))
    }

    pub fn reject_loan(&self, number: &LoanNumber, reason: &str, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| lifecycle.reject(loan, reason, time))
    }

    pub fn refresh_overdue(&self, number: &LoanNumber, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| {
            lifecycle.refresh_overdue(loan, time);
            Ok(())
        })
    }

    pub fn mark_defaulted(&self, number: &LoanNumber, reason: &str, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| lifecycle.mark_defaulted(loan, reason, time))
    }

    pub fn assess_late_fee(
        &self,
        number: &LoanNumber,
        installment_number: u32,
        product: &LoanProduct,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| {
            lifecycle
                .assess_late_fee(loan, installment_number, product, time)
                .map(|_| ())
        })
    }

    pub fn write_off(&self, number: &LoanNumber, reason: &str, time: &SafeTimeProvider) -> Result<Loan> {
        self.with_loan(number, |lifecycle, loan| lifecycle.write_off(loan, reason, time).map(|_| ()))
    }

    pub fn disburse_loan(&self, number: &LoanNumber, time: &SafeTimeProvider) -> Result<Loan> {
        let loan_account = self.store.load_loan(number)?.value.account_id;
        self.locked(vec![loan_key(number), account_key(&loan_account)], || {
            let mut loan = self.store.load_loan(number)?;
            let mut book = self.store.load_account(&loan_account)?;
            let mut lifecycle = LoanLifecycle::new();
            lifecycle.disburse(&mut loan.value, &mut book.value, time)?;
            let disbursed = loan.value.clone();
            self.store.commit(Changeset::new().loan(loan).account(book))?;
            self.publish(lifecycle.take_events());
            Ok(disbursed)
        })
    }

    pub fn record_repayment(
        &self,
        number: &LoanNumber,
        payer: &AccountId,
        amount: Money,
        reference: &str,
        time: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        let loan_account = self.store.load_loan(number)?.value.account_id;
        if *payer == loan_account {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("loan {} cannot be repaid from its own account", number),
            });
        }

        let keys = vec![loan_key(number), account_key(payer), account_key(&loan_account)];
        self.locked(keys, || {
            let mut loan = self.store.load_loan(number)?;
            let mut payer_book = self.store.load_account(payer)?;
            let mut loan_book = self.store.load_account(&loan_account)?;
            let mut lifecycle = LoanLifecycle::new();
            let allocation = lifecycle.record_repayment(
                &mut loan.value,
                amount,
                &mut payer_book.value,
                &mut loan_book.value,
                reference,
                time,
            )?;
            self.store.commit(
                Changeset::new()
                    .loan(loan)
                    .account(payer_book)
                    .account(loan_book),
            )?;
            self.publish(lifecycle.take_events());
            Ok(allocation)
        })
    }

    /// run a single-loan transition under that loan's lock
    fn with_loan(
        &self,
        number: &LoanNumber,
        transition: impl FnOnce(&mut LoanLifecycle, &mut Loan) -> Result<()>,
    ) -> Result<Loan> {
        self.locked(vec![loan_key(number)], || {
            let mut loan = self.store.load_loan(number)?;
            let mut lifecycle = LoanLifecycle::new();
            transition(&mut lifecycle, &mut loan.value)?;
            let updated = loan.value.clone();
            self.store.save_loan(loan)?;
            self.publish(lifecycle.take_events());
            Ok(updated)
        })
    }

    fn change_account_status(
        &self,
        id: &AccountId,
        time: &SafeTimeProvider,
        change: impl FnOnce(&mut LedgerAccount) -> Result<AccountStatus>,
    ) -> Result<()> {
        self.locked(vec![account_key(id)], || {
            let mut book = self.store.load_account(id)?;
            let old_status = change(&mut book.value.account).map_err(|e| {
                warn!(account = %id, error = %e, "account status change rejected");
                e
            })?;
            let new_status = book.value.account.status;
            self.store.save_account(book)?;

            info!(account = %id, ?old_status, ?new_status, "account status changed");
            self.events.lock().emit(Event::AccountStatusChanged {
                account_id: id.clone(),
                old_status,
                new_status,
                timestamp: time.now(),
            });
            Ok(())
        })
    }

    /// hold every named aggregate lock for the duration of `operation`
    fn locked<R>(&self, keys: Vec<String>, operation: impl FnOnce() -> Result<R>) -> Result<R> {
        let keys = AggregateLocks::ordered(keys);
        let handles = self.locks.handles(&keys);
        let result = {
            let _guards: Vec<_> = handles.iter().map(|h| h.lock()).collect();
            operation()
        };
        drop(handles);
        self.locks.release(&keys);
        result
    }

    fn publish(&self, events: Vec<Event>) {
        self.events.lock().extend(events);
    }
}

/// one mutex per aggregate key, created on first use and dropped once no caller holds it
#[derive(Debug, Default)]
struct AggregateLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AggregateLocks {
    /// ascending key order, duplicates removed, so every caller locks in the same order
    fn ordered(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys.dedup();
        keys
    }

    fn handles(&self, keys: &[String]) -> Vec<Arc<Mutex<()>>> {
        let mut table = self.table.lock();
        keys.iter()
            .map(|key| table.entry(key.clone()).or_default().clone())
            .collect()
    }

    /// forget handles only the table still references
    fn release(&self, keys: &[String]) {
        let mut table = self.table.lock();
        for key in keys {
            if table.get(key).is_some_and(|h| Arc::strong_count(h) == 1) {
                table.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().len()
    }
}

fn loan_key(number: &LoanNumber) -> String {
    format!("loan:{}", number)
}

fn account_key(id: &AccountId) -> String {
    format!("account:{}", id)
}
