//! Ledger accounts
//!
//! A ledger account is one (member, currency) pair holding an available
//! balance and a locked amount. Locked funds back still-open orders; they
//! are reserved at order placement and consumed or released at settlement.
//!
//! Invariant: balance and locked are both non-negative at all times. The
//! only way to move funds is through the four primitives below; nothing
//! else may write these fields.

use crate::errors::LedgerError;
use crate::ids::{Currency, MemberId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Key addressing one ledger account.
///
/// Ordered member-first so a set of keys sorts into a canonical
/// lock-acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub member_id: MemberId,
    pub currency: Currency,
}

impl AccountKey {
    pub fn new(member_id: MemberId, currency: Currency) -> Self {
        Self {
            member_id,
            currency,
        }
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.member_id, self.currency)
    }
}

/// Per-member, per-currency balance/locked pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub member_id: MemberId,
    pub currency: Currency,
    pub balance: Decimal,
    pub locked: Decimal,
}

impl Account {
    /// Create an empty account.
    pub fn new(member_id: MemberId, currency: Currency) -> Self {
        Self {
            member_id,
            currency,
            balance: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.member_id, self.currency.clone())
    }

    /// Total funds held for this member in this currency.
    pub fn amount(&self) -> Decimal {
        self.balance + self.locked
    }

    /// Check the non-negativity invariant.
    pub fn check_invariant(&self) -> bool {
        self.balance >= Decimal::ZERO && self.locked >= Decimal::ZERO
    }

    /// Move funds balance → locked (order placement reservation).
    pub fn lock(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        assert!(amount >= Decimal::ZERO, "Lock amount must be non-negative");
        if amount > self.balance {
            return Err(LedgerError::InsufficientBalance {
                currency: self.currency.clone(),
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.locked += amount;
        Ok(())
    }

    /// Move funds locked → balance (reservation release).
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        assert!(amount >= Decimal::ZERO, "Unlock amount must be non-negative");
        if amount > self.locked {
            return Err(LedgerError::InsufficientLocked {
                currency: self.currency.clone(),
                requested: amount,
                locked: self.locked,
            });
        }
        self.locked -= amount;
        self.balance += amount;
        Ok(())
    }

    /// Remove funds from the locked pool; they leave this account's custody.
    pub fn debit_locked(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        assert!(amount >= Decimal::ZERO, "Debit amount must be non-negative");
        if amount > self.locked {
            return Err(LedgerError::InsufficientLocked {
                currency: self.currency.clone(),
                requested: amount,
                locked: self.locked,
            });
        }
        self.locked -= amount;
        Ok(())
    }

    /// Add funds to the available balance. Never fails.
    pub fn credit(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Credit amount must be non-negative");
        self.balance += amount;
    }
}
