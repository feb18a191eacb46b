//! Trade event publication
//!
//! One event per settled trade, pushed to downstream consumers (tickers,
//! order-book broadcasters) after the trade is durable. Delivery is
//! at-least-once from the engine's perspective; consumers must tolerate
//! duplicates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use tracing::{info, warn};
use types::ids::{MarketId, OrderId, TradeId};
use types::numeric::{Price, Quantity};
use types::trade::{Trade, Trend};

/// Public event describing one settled trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub trade_id: TradeId,
    pub market_id: MarketId,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    pub price: Price,
    pub volume: Quantity,
    pub funds: Decimal,
    pub trend: Trend,
    pub created_at: DateTime<Utc>,
}

impl TradeExecutedEvent {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            market_id: trade.market_id.clone(),
            ask_order_id: trade.ask_order_id,
            bid_order_id: trade.bid_order_id,
            price: trade.price,
            volume: trade.volume,
            funds: trade.funds,
            trend: trade.trend,
            created_at: trade.created_at,
        }
    }
}

/// Sink for settled-trade events.
///
/// Implementations adapt the engine to whatever transport carries trade
/// announcements; publication must not fail the settlement that produced
/// the trade.
pub trait TradeNotifier: Send + Sync {
    fn publish(&self, event: &TradeExecutedEvent);
}

/// Notifier that logs each event's JSON payload.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl TradeNotifier for LogNotifier {
    fn publish(&self, event: &TradeExecutedEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(target: "settlement::events", %payload, "trade executed"),
            Err(err) => {
                warn!(target: "settlement::events", error = %err, "failed to encode trade event")
            }
        }
    }
}

/// Notifier that forwards events to an in-process channel.
#[derive(Debug)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<TradeExecutedEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<TradeExecutedEvent>) -> Self {
        Self { sender }
    }
}

impl TradeNotifier for ChannelNotifier {
    fn publish(&self, event: &TradeExecutedEvent) {
        if self.sender.send(event.clone()).is_err() {
            warn!(target: "settlement::events", trade_id = %event.trade_id, "trade event consumer disconnected");
        }
    }
}
