//! Trade Settlement Service
//!
//! Takes a candidate match between a resting ask and a resting bid (already
//! paired by the order-book matcher) and turns it into an atomic, auditable
//! transfer of funds between member accounts, plus a durable trade record
//! and a downstream notification.
//!
//! **Key invariants:**
//! - Funds are never lost or duplicated: every settlement either applies all
//!   of its ledger transfers, order mutations, and the trade record, or none
//!   of them.
//! - Account balances and locked pools never go negative.
//! - At most one settlement is in flight for a given order or account at any
//!   instant.
//!
//! # Architecture
//!
//! ```text
//! Matcher (external)
//!        │ MatchRequest
//!    ┌───▼────────┐
//!    │  Engine    │  ← validates, locks orders + accounts
//!    └───┬────────┘
//!   ┌────┴─────┬──────────┐
//! ┌─▼──┐  ┌───▼───┐  ┌───▼────┐
//! │Fees│  │Ledger │  │Journal │
//! └────┘  └───────┘  └───┬────┘
//!                        │ Trade
//!                  ┌─────▼─────┐
//!                  │ Notifier  │ → message bus
//!                  └───────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fees;
pub mod journal;
pub mod ledger;
pub mod market;

pub use config::SettlementConfig;
pub use engine::{MatchRequest, SettlementEngine};
pub use error::{MatchViolation, SettlementError};
pub use events::{ChannelNotifier, LogNotifier, TradeExecutedEvent, TradeNotifier};
pub use fees::{FeeAssessment, FeePolicy};
pub use journal::{JournalError, TradeJournal};
pub use ledger::Ledger;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";
