//! Per-market settlement state
//!
//! The engine only needs one mutable fact per market: the price of its most
//! recent trade, which drives the trend of the next one.

use types::ids::MarketId;
use types::numeric::Price;
use types::trade::Trend;

/// Mutable per-market state owned by the settlement engine.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub id: MarketId,
    /// Price of the most recent settled trade, if any.
    pub last_price: Option<Price>,
}

impl MarketState {
    pub fn new(id: MarketId) -> Self {
        Self {
            id,
            last_price: None,
        }
    }

    /// Trend of a trade striking at `price`: UP at or above the last trade
    /// (ties favor UP, as does an empty market), DOWN strictly below.
    pub fn trend_for(&self, price: Price) -> Trend {
        match self.last_price {
            Some(last) if price < last => Trend::DOWN,
            _ => Trend::UP,
        }
    }

    /// Record a settled trade's strike price.
    pub fn record(&mut self, price: Price) {
        self.last_price = Some(price);
    }
}
