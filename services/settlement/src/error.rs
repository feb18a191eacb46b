//! Settlement error taxonomy
//!
//! Three failure classes with different caller contracts:
//! - `InvalidMatch` is structural and non-retryable; the matcher must not
//!   resubmit the same pair without recomputing the match.
//! - `Ledger` means an account could not fund a transfer; the whole
//!   settlement aborted with no partial effect, and retrying the unchanged
//!   match would fail identically.
//! - `ContentionTimeout` is retryable with the same request.

use crate::journal::JournalError;
use thiserror::Error;
use types::errors::LedgerError;
use types::ids::{Currency, MarketId, MemberId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{OrderState, Side};

/// Structural or pricing precondition violated by a proposed match.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchViolation {
    #[error("unknown market {market_id}")]
    UnknownMarket { market_id: MarketId },

    #[error("unknown order {order_id}")]
    UnknownOrder { order_id: OrderId },

    #[error("ask and bid reference the same order {order_id}")]
    IdenticalOrders { order_id: OrderId },

    #[error("order {order_id} belongs to market {actual}, match is for {expected}")]
    ForeignOrder {
        order_id: OrderId,
        expected: MarketId,
        actual: MarketId,
    },

    #[error("order {order_id} is on the {actual} side, expected {expected}")]
    SideMismatch {
        order_id: OrderId,
        expected: Side,
        actual: Side,
    },

    #[error("order {order_id} is not open (state: {state:?})")]
    OrderNotOpen {
        order_id: OrderId,
        state: OrderState,
    },

    #[error("matched volume must be positive")]
    NonPositiveVolume,

    #[error("limit prices do not cross: bid {bid_price} below ask {ask_price}")]
    PriceNotCrossed {
        ask_price: Price,
        bid_price: Price,
    },

    #[error("matched volume {requested} exceeds remaining volume {remaining} of order {order_id}")]
    VolumeExceedsRemaining {
        order_id: OrderId,
        remaining: Quantity,
        requested: Quantity,
    },

    #[error("matched funds {actual} inconsistent with price × volume = {expected}")]
    FundsMismatch {
        expected: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },

    #[error("no {currency} account for member {member_id}")]
    UnknownAccount {
        member_id: MemberId,
        currency: Currency,
    },
}

/// Top-level settlement failure.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("invalid match: {0}")]
    InvalidMatch(#[from] MatchViolation),

    #[error("{side} leg failed for member {member_id}: {source}")]
    Ledger {
        side: Side,
        member_id: MemberId,
        #[source]
        source: LedgerError,
    },

    #[error("could not acquire {resource} lock within {waited_ms} ms")]
    ContentionTimeout { resource: String, waited_ms: u64 },

    #[error("trade journal append failed: {0}")]
    Journal(#[from] JournalError),
}

impl SettlementError {
    /// Whether the caller may retry the same match request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::ContentionTimeout { .. })
    }
}
