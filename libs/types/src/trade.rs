//! Settled-trade records
//!
//! A Trade is the immutable outcome of one settled match: written exactly
//! once per successful settlement, never mutated or deleted.

use crate::ids::{MarketId, OrderId, TradeId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade's price relative to the market's prior trade.
///
/// A strike at or above the previous price is UP (also the default for a
/// market with no history); strictly below is DOWN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    UP,
    DOWN,
}

/// One settled match between a resting ask and a resting bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market_id: MarketId,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    /// Strike price the match executed at.
    pub price: Price,
    /// Matched volume in base-currency units.
    pub volume: Quantity,
    /// Matched funds in quote-currency units (price × volume).
    pub funds: Decimal,
    pub trend: Trend,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market_id: MarketId,
        ask_order_id: OrderId,
        bid_order_id: OrderId,
        price: Price,
        volume: Quantity,
        funds: Decimal,
        trend: Trend,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            market_id,
            ask_order_id,
            bid_order_id,
            price,
            volume,
            funds,
            trend,
            created_at,
        }
    }

    /// Trade value (price × volume).
    pub fn value(&self) -> Decimal {
        self.price.as_decimal() * self.volume.as_decimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            MarketId::new("BTC/USDT"),
            OrderId::new(),
            OrderId::new(),
            Price::from_u64(10),
            Quantity::from_str("5").unwrap(),
            Decimal::from(50),
            Trend::UP,
            Utc::now(),
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = sample_trade();
        assert_eq!(trade.trend, Trend::UP);
        assert_eq!(trade.funds, Decimal::from(50));
        assert_eq!(trade.value(), trade.funds);
    }

    #[test]
    fn test_trend_wire_format() {
        assert_eq!(serde_json::to_string(&Trend::UP).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&Trend::DOWN).unwrap(), "\"down\"");
    }

    #[test]
    fn test_trade_serialization() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let deserialized: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deserialized);
    }
}
