//! Ledger error taxonomy
//!
//! Errors raised by the account balance primitives, using thiserror.
//! Each variant carries the currency and the exact amounts involved so a
//! failed settlement can be logged and alerted on without re-querying state.

use crate::ids::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure of a single ledger account primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient {currency} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        currency: Currency,
        requested: Decimal,
        available: Decimal,
    },

    #[error("insufficient {currency} locked funds: requested {requested}, locked {locked}")]
    InsufficientLocked {
        currency: Currency,
        requested: Decimal,
        locked: Decimal,
    },
}
