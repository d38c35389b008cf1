use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::ledger::AccountBook;
use crate::lending::Loan;
use crate::types::{AccountId, LoanNumber};

/// an aggregate as it was read, tagged with the version it was read at;
/// version 0 means not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self { version: 0, value }
    }
}

pub trait LoanRepository {
    fn load_loan(&self, number: &LoanNumber) -> Result<Versioned<Loan>>;

    /// optimistic save; returns the new version
    fn save_loan(&self, loan: Versioned<Loan>) -> Result<u64>;
}

pub trait AccountRepository {
    fn load_account(&self, id: &AccountId) -> Result<Versioned<AccountBook>>;

    /// optimistic save; returns the new version
    fn save_account(&self, book: Versioned<AccountBook>) -> Result<u64>;
}

/// aggregates written together by one operation
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub loans: Vec<Versioned<Loan>>,
    pub accounts: Vec<Versioned<AccountBook>>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan(mut self, loan: Versioned<Loan>) -> Self {
        self.loans.push(loan);
        self
    }

    pub fn account(mut self, book: Versioned<AccountBook>) -> Self {
        self.accounts.push(book);
        self
    }
}

pub trait LedgerStore: LoanRepository + AccountRepository + Send + Sync {
    /// save existing aggregates all-or-nothing: every version is checked before any write
    fn commit(&self, changes: Changeset) -> Result<()>;
}

type Slot<T> = Arc<Mutex<Versioned<T>>>;

/// in-memory store with one lock per aggregate; the map lock is held only to find a slot
#[derive(Debug, Default)]
pub struct InMemoryStore {
    loans: RwLock<HashMap<LoanNumber, Slot<Loan>>>,
    accounts: RwLock<HashMap<AccountId, Slot<AccountBook>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan_count(&self) -> usize {
        self.loans.read().len()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    fn loan_slot(&self, number: &LoanNumber) -> Result<Slot<Loan>> {
        find_slot(&self.loans, number).ok_or_else(|| LedgerError::LoanNotFound {
            id: number.to_string(),
        })
    }

    fn account_slot(&self, id: &AccountId) -> Result<Slot<AccountBook>> {
        find_slot(&self.accounts, id).ok_or_else(|| LedgerError::AccountNotFound { id: id.clone() })
    }
}

impl LoanRepository for InMemoryStore {
    fn load_loan(&self, number: &LoanNumber) -> Result<Versioned<Loan>> {
        let slot = self.loan_slot(number)?;
        let stored = slot.lock();
        Ok(stored.clone())
    }

    fn save_loan(&self, loan: Versioned<Loan>) -> Result<u64> {
        let number = loan.value.loan_number.clone();
        let key = loan.value.aggregate_key();
        if loan.version == 0 {
            return insert_slot(&self.loans, number, key, loan.value);
        }
        let slot = self.loan_slot(&number)?;
        let mut stored = slot.lock();
        overwrite(&mut stored, loan, &key)
    }
}

impl AccountRepository for InMemoryStore {
    fn load_account(&self, id: &AccountId) -> Result<Versioned<AccountBook>> {
        let slot = self.account_slot(id)?;
        let stored = slot.lock();
        Ok(stored.clone())
    }

    fn save_account(&self, book: Versioned<AccountBook>) -> Result<u64> {
        let id = book.value.account.id.clone();
        let key = book.value.account.aggregate_key();
        if book.version == 0 {
            return insert_slot(&self.accounts, id, key, book.value);
        }
        let slot = self.account_slot(&id)?;
        let mut stored = slot.lock();
        overwrite(&mut stored, book, &key)
    }
}

impl LedgerStore for InMemoryStore {
    fn commit(&self, changes: Changeset) -> Result<()> {
        let mut accounts = changes.accounts;
        let mut loans = changes.loans;
        accounts.sort_by(|a, b| a.value.account.id.cmp(&b.value.account.id));
        loans.sort_by(|a, b| a.value.loan_number.cmp(&b.value.loan_number));

        if accounts.windows(2).any(|w| w[0].value.account.id == w[1].value.account.id)
            || loans.windows(2).any(|w| w[0].value.loan_number == w[1].value.loan_number)
        {
            return Err(LedgerError::InvalidConfiguration {
                message: "changeset names the same aggregate twice".to_string(),
            });
        }

        let account_slots = accounts
            .iter()
            .map(|b| self.account_slot(&b.value.account.id))
            .collect::<Result<Vec<_>>>()?;
        let loan_slots = loans
            .iter()
            .map(|l| self.loan_slot(&l.value.loan_number))
            .collect::<Result<Vec<_>>>()?;

        // slots are locked in key order, accounts before loans
        let mut account_guards: Vec<_> = account_slots.iter().map(|s| s.lock()).collect();
        let mut loan_guards: Vec<_> = loan_slots.iter().map(|s| s.lock()).collect();

        for (stored, incoming) in account_guards.iter().zip(&accounts) {
            check_version(stored.version, incoming.version, &incoming.value.account.aggregate_key())?;
        }
        for (stored, incoming) in loan_guards.iter().zip(&loans) {
            check_version(stored.version, incoming.version, &incoming.value.aggregate_key())?;
        }

        for (stored, incoming) in account_guards.iter_mut().zip(accounts) {
            stored.version += 1;
            stored.value = incoming.value;
        }
        for (stored, incoming) in loan_guards.iter_mut().zip(loans) {
            stored.version += 1;
            stored.value = incoming.value;
        }
        Ok(())
    }
}

fn find_slot<K: Hash + Eq, T>(map: &RwLock<HashMap<K, Slot<T>>>, key: &K) -> Option<Slot<T>> {
    map.read().get(key).cloned()
}

fn insert_slot<K: Hash + Eq, T>(
    map: &RwLock<HashMap<K, Slot<T>>>,
    key: K,
    aggregate: String,
    value: T,
) -> Result<u64> {
    let mut slots = map.write();
    if let Some(existing) = slots.get(&key) {
        let found = existing.lock().version;
        return Err(LedgerError::AggregateConflict {
            aggregate,
            expected: 0,
            found,
        });
    }
    slots.insert(key, Arc::new(Mutex::new(Versioned { version: 1, value })));
    Ok(1)
}

fn overwrite<T>(stored: &mut Versioned<T>, incoming: Versioned<T>, aggregate: &str) -> Result<u64> {
    check_version(stored.version, incoming.version, aggregate)?;
    stored.version += 1;
    stored.value = incoming.value;
    Ok(stored.version)
}

fn check_version(stored: u64, expected: u64, aggregate: &str) -> Result<()> {
    if stored != expected {
        return Err(LedgerError::AggregateConflict {
            aggregate: aggregate.to_string(),
            expected,
            found: stored,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::AccountConfig;
    use crate::decimal::Money;
    use crate::ledger::LedgerAccount;

    fn book(id: &str) -> AccountBook {
        AccountBook::new(LedgerAccount::open(
            AccountId::new(id),
            None,
            AccountConfig::savings("KES"),
            Utc::now(),
        ))
    }

    #[test]
    fn test_insert_then_load() {
        let store = InMemoryStore::new();
        assert_eq!(store.save_account(Versioned::new(book("A"))).unwrap(), 1);

        let loaded = store.load_account(&AccountId::new("A")).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.value.account.id, AccountId::new("A"));
        assert!(loaded.value.postings.is_empty());
        assert!(matches!(
            store.load_account(&AccountId::new("B")),
            Err(LedgerError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_insert_conflicts() {
        let store = InMemoryStore::new();
        store.save_account(Versioned::new(book("A"))).unwrap();
        let err = store.save_account(Versioned::new(book("A"))).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_stale_save_conflicts() {
        let store = InMemoryStore::new();
        store.save_account(Versioned::new(book("A"))).unwrap();

        let mut first = store.load_account(&AccountId::new("A")).unwrap();
        let mut second = store.load_account(&AccountId::new("A")).unwrap();
        first.value.account.balance = Money::from_major(1);
        second.value.account.balance = Money::from_major(2);

        assert_eq!(store.save_account(first).unwrap(), 2);
        let err = store.save_account(second).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AggregateConflict {
                aggregate: "account:A".to_string(),
                expected: 1,
                found: 2
            }
        );
        let stored = store.load_account(&AccountId::new("A")).unwrap();
        assert_eq!(stored.value.account.balance, Money::from_major(1));
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.save_account(Versioned::new(book("A"))).unwrap();
        store.save_account(Versioned::new(book("B"))).unwrap();

        let mut a = store.load_account(&AccountId::new("A")).unwrap();
        let b = store.load_account(&AccountId::new("B")).unwrap();
        store.save_account(b.clone()).unwrap();

        a.value.account.balance = Money::from_major(9);
        let err = store.commit(Changeset::new().account(a).account(b)).unwrap_err();
        assert!(matches!(err, LedgerError::AggregateConflict { .. }));

        let a = store.load_account(&AccountId::new("A")).unwrap();
        assert_eq!(a.version, 1);
        assert_eq!(a.value.account.balance, Money::ZERO);
    }

    #[test]
    fn test_commit_bumps_every_version() {
        let store = InMemoryStore::new();
        store.save_account(Versioned::new(book("A"))).unwrap();
        store.save_account(Versioned::new(book("B"))).unwrap();
        let a = store.load_account(&AccountId::new("A")).unwrap();
        let b = store.load_account(&AccountId::new("B")).unwrap();

        store.commit(Changeset::new().account(b.clone()).account(a.clone())).unwrap();
        assert_eq!(store.load_account(&AccountId::new("A")).unwrap().version, 2);
        assert_eq!(store.load_account(&AccountId::new("B")).unwrap().version, 2);

        assert!(store.commit(Changeset::new().account(a.clone()).account(a)).is_err());
    }
}
