//! Ledger account registry and the settlement transaction unit
//!
//! Accounts live behind per-account mutexes in a concurrent registry, so
//! settlements touching disjoint accounts proceed in parallel while the
//! engine holds every involved account exclusively for one match.
//!
//! `LedgerTx` is the all-or-nothing unit: it clones the locked accounts,
//! applies the four balance primitives to the clones, and only `commit`
//! makes anything visible. Dropping the transaction after a failed step
//! rolls the whole unit back for free.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use types::account::{Account, AccountKey};
use types::errors::LedgerError;
use types::ids::{Currency, MemberId};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Concurrent registry of ledger accounts.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: DashMap<AccountKey, Arc<Mutex<Account>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an account exists, returning its key.
    pub fn open(&self, member_id: MemberId, currency: Currency) -> AccountKey {
        let key = AccountKey::new(member_id, currency.clone());
        self.accounts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(member_id, currency))));
        key
    }

    /// Credit an account's balance, opening it if needed.
    pub fn deposit(&self, member_id: MemberId, currency: Currency, amount: Decimal) {
        let key = self.open(member_id, currency);
        if let Some(handle) = self.handle(&key) {
            guard(&handle).credit(amount);
        }
    }

    /// Reserve available funds against an order (placement-time lock).
    pub fn lock_funds(
        &self,
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let key = self.open(member_id, currency);
        match self.handle(&key) {
            Some(handle) => guard(&handle).lock(amount),
            None => Ok(()),
        }
    }

    /// Release reserved funds back to the balance (order cancellation).
    pub fn unlock_funds(
        &self,
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let key = self.open(member_id, currency);
        match self.handle(&key) {
            Some(handle) => guard(&handle).unlock(amount),
            None => Ok(()),
        }
    }

    /// Point-in-time snapshot of one account.
    pub fn account(&self, member_id: MemberId, currency: &Currency) -> Option<Account> {
        let key = AccountKey::new(member_id, currency.clone());
        self.handle(&key).map(|handle| guard(&handle).clone())
    }

    pub fn contains(&self, key: &AccountKey) -> bool {
        self.accounts.contains_key(key)
    }

    /// Shared handle to an account's mutex for exclusive acquisition.
    pub(crate) fn handle(&self, key: &AccountKey) -> Option<Arc<Mutex<Account>>> {
        self.accounts.get(key).map(|entry| Arc::clone(entry.value()))
    }
}

/// Working set of account clones for one settlement.
///
/// All four primitives operate on the clones; the registry is untouched
/// until `commit` writes them back under the caller's held guards.
#[derive(Debug)]
pub struct LedgerTx {
    working: Vec<Account>,
}

impl LedgerTx {
    /// Begin a transaction over the accounts the caller has locked.
    pub fn begin(guards: &[MutexGuard<'_, Account>]) -> Self {
        Self {
            working: guards.iter().map(|g| (**g).clone()).collect(),
        }
    }

    fn entry(&mut self, key: &AccountKey) -> &mut Account {
        self.working
            .iter_mut()
            .find(|account| account.key() == *key)
            .expect("account not enlisted in settlement transaction")
    }

    /// Balance of an enlisted account, if present.
    pub fn balance(&self, key: &AccountKey) -> Option<Decimal> {
        self.working
            .iter()
            .find(|account| account.key() == *key)
            .map(|account| account.balance)
    }

    pub fn lock(&mut self, key: &AccountKey, amount: Decimal) -> Result<(), LedgerError> {
        self.entry(key).lock(amount)
    }

    pub fn unlock(&mut self, key: &AccountKey, amount: Decimal) -> Result<(), LedgerError> {
        self.entry(key).unlock(amount)
    }

    pub fn debit_locked(&mut self, key: &AccountKey, amount: Decimal) -> Result<(), LedgerError> {
        self.entry(key).debit_locked(amount)
    }

    pub fn credit(&mut self, key: &AccountKey, amount: Decimal) {
        self.entry(key).credit(amount)
    }

    /// Write the working set back. Guards must be the same accounts the
    /// transaction began over.
    pub fn commit(self, guards: &mut [MutexGuard<'_, Account>]) {
        for account in self.working {
            let key = account.key();
            let slot = guards
                .iter_mut()
                .find(|g| g.key() == key)
                .expect("committing account that was never locked");
            **slot = account;
        }
    }
}
