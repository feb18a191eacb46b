//! Order lifecycle types
//!
//! A resting order as the settlement service sees it: remaining volume,
//! remaining locked reservation, and the completion state machine. Orders
//! are created by placement (elsewhere) and mutated only during settlement;
//! terminal orders are never deleted.

use crate::ids::{Currency, MarketId, MemberId, OrderId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side. An ask sells the base currency, a bid buys it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    ASK,
    BID,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::ASK => Side::BID,
            Side::BID => Side::ASK,
        }
    }

    /// Currency this side reserves (and pays out of) for the given market.
    pub fn reserve_currency(&self, market: &MarketId) -> Currency {
        match self {
            Side::ASK => market.base(),
            Side::BID => market.quote(),
        }
    }

    /// Currency this side receives when a match settles.
    pub fn receive_currency(&self, market: &MarketId) -> Currency {
        match self {
            Side::ASK => market.quote(),
            Side::BID => market.base(),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::ASK => write!(f, "ask"),
            Side::BID => write!(f, "bid"),
        }
    }
}

/// Order pricing kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    LIMIT,
    MARKET,
}

/// Order lifecycle state.
///
/// OPEN is the only non-terminal state; DONE (fully filled) and CANCELED
/// (market order out of funds) are terminal and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    OPEN,
    DONE,
    CANCELED,
}

impl OrderState {
    /// Check if state is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::DONE | OrderState::CANCELED)
    }
}

/// A resting order with its remaining quantities and reservation.
///
/// `locked` tracks, in the reserve currency, the portion of the account
/// reservation this order still accounts for. After a price-improvement
/// fill it can retain a nonzero residual even on a DONE order; that
/// residual is reconciled by an external process, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_id: MemberId,
    pub market_id: MarketId,
    pub side: Side,
    pub kind: OrderKind,
    /// Limit price; None for market orders.
    pub price: Option<Price>,
    /// Volume at placement.
    pub origin_volume: Quantity,
    /// Remaining volume.
    pub volume: Quantity,
    /// Remaining locked reservation, in reserve-currency units.
    pub locked: Decimal,
    /// Number of settlements this order has participated in.
    pub trades_count: u64,
    pub state: OrderState,
    /// Elected alternate fee currency, if any.
    pub fee_currency: Option<Currency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create an open limit order with its placement-time reservation.
    pub fn limit(
        member_id: MemberId,
        market_id: MarketId,
        side: Side,
        price: Price,
        volume: Quantity,
        locked: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            member_id,
            market_id,
            side,
            kind: OrderKind::LIMIT,
            price: Some(price),
            origin_volume: volume,
            volume,
            locked,
            trades_count: 0,
            state: OrderState::OPEN,
            fee_currency: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an open market order with its placement-time reservation.
    pub fn market(
        member_id: MemberId,
        market_id: MarketId,
        side: Side,
        volume: Quantity,
        locked: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            member_id,
            market_id,
            side,
            kind: OrderKind::MARKET,
            price: None,
            origin_volume: volume,
            volume,
            locked,
            trades_count: 0,
            state: OrderState::OPEN,
            fee_currency: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Elect an alternate fee currency.
    pub fn with_fee_currency(mut self, currency: Currency) -> Self {
        self.fee_currency = Some(currency);
        self
    }

    /// Eligibility for paying fees in the elected utility currency: the
    /// election must name a currency outside the traded pair.
    pub fn utility_fee_elected(&self, market: &MarketId) -> bool {
        match &self.fee_currency {
            Some(currency) => *currency != market.base() && *currency != market.quote(),
            None => false,
        }
    }

    /// Amount of this order's own reservation consumed by one increment of
    /// matched volume: an ask reserved base units, a limit bid reserved at
    /// its own price, a market bid reserved exactly the matched funds.
    pub fn reservation_for(&self, volume: Quantity, funds: Decimal) -> Decimal {
        match self.side {
            Side::ASK => volume.as_decimal(),
            Side::BID => match self.price {
                Some(price) => price.as_decimal() * volume.as_decimal(),
                None => funds,
            },
        }
    }

    /// Apply one settled increment: reduce remaining volume by the matched
    /// volume and `locked` by the funds actually debited, bump the trade
    /// counter, then evaluate the completion policy.
    ///
    /// # Panics
    /// Panics if the order is already terminal.
    pub fn fill(
        &mut self,
        matched: Quantity,
        consumed: Decimal,
        tolerance: Decimal,
        now: DateTime<Utc>,
    ) {
        assert!(!self.state.is_terminal(), "Cannot fill terminal order");
        assert!(
            consumed >= Decimal::ZERO,
            "Consumed amount must be non-negative"
        );

        let remaining = self.volume.as_decimal() - matched.as_decimal();
        self.volume = if remaining <= tolerance {
            Quantity::zero()
        } else {
            Quantity::try_new(remaining).unwrap_or_else(Quantity::zero)
        };

        self.locked -= consumed;
        if self.locked.abs() <= tolerance {
            self.locked = Decimal::ZERO;
        }

        self.trades_count += 1;
        self.updated_at = now;

        self.state = if self.volume.is_zero() {
            OrderState::DONE
        } else if self.kind == OrderKind::MARKET && self.locked <= tolerance {
            // Nothing left to continue matching with; cannot be resumed.
            OrderState::CANCELED
        } else {
            OrderState::OPEN
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tolerance() -> Decimal {
        Decimal::new(1, 12)
    }

    fn limit_order(side: Side, price: u64, volume: &str) -> Order {
        let price = Price::from_u64(price);
        let volume = Quantity::from_str(volume).unwrap();
        let locked = match side {
            Side::ASK => volume.as_decimal(),
            Side::BID => price.as_decimal() * volume.as_decimal(),
        };
        Order::limit(
            MemberId::new(),
            MarketId::new("BTC/USDT"),
            side,
            price,
            volume,
            locked,
            Utc::now(),
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::ASK.opposite(), Side::BID);
        assert_eq!(Side::BID.opposite(), Side::ASK);
    }

    #[test]
    fn test_side_currency_roles() {
        let market = MarketId::new("BTC/USDT");
        assert_eq!(Side::ASK.reserve_currency(&market), Currency::new("BTC"));
        assert_eq!(Side::ASK.receive_currency(&market), Currency::new("USDT"));
        assert_eq!(Side::BID.reserve_currency(&market), Currency::new("USDT"));
        assert_eq!(Side::BID.receive_currency(&market), Currency::new("BTC"));
    }

    #[test]
    fn test_order_creation() {
        let order = limit_order(Side::BID, 10, "5");
        assert_eq!(order.state, OrderState::OPEN);
        assert_eq!(order.kind, OrderKind::LIMIT);
        assert_eq!(order.trades_count, 0);
        assert_eq!(order.locked, Decimal::from(50));
    }

    #[test]
    fn test_full_fill_marks_done() {
        let mut order = limit_order(Side::ASK, 10, "5");
        order.fill(
            Quantity::from_str("5").unwrap(),
            Decimal::from(5),
            tolerance(),
            Utc::now(),
        );

        assert_eq!(order.state, OrderState::DONE);
        assert!(order.volume.is_zero());
        assert_eq!(order.locked, Decimal::ZERO);
        assert_eq!(order.trades_count, 1);
    }

    #[test]
    fn test_partial_fill_stays_open() {
        let mut order = limit_order(Side::ASK, 10, "7");
        order.fill(
            Quantity::from_str("5").unwrap(),
            Decimal::from(5),
            tolerance(),
            Utc::now(),
        );

        assert_eq!(order.state, OrderState::OPEN);
        assert_eq!(order.volume, Quantity::from_str("2").unwrap());
        assert_eq!(order.locked, Decimal::from(2));
    }

    #[test]
    fn test_market_order_cancels_when_locked_runs_out() {
        let mut order = Order::market(
            MemberId::new(),
            MarketId::new("BTC/USDT"),
            Side::BID,
            Quantity::from_str("2.0").unwrap(),
            Decimal::from(3),
            Utc::now(),
        );

        // 1.5 of 2.0 filled, but the whole 3.0 reservation is consumed.
        order.fill(
            Quantity::from_str("1.5").unwrap(),
            Decimal::from(3),
            tolerance(),
            Utc::now(),
        );

        assert_eq!(order.state, OrderState::CANCELED);
        assert_eq!(order.volume, Quantity::from_str("0.5").unwrap());
        assert_eq!(order.locked, Decimal::ZERO);
    }

    #[test]
    fn test_price_improvement_residual_is_preserved() {
        // Bid reserved at its own price 10, strike executed at 9.
        let mut order = limit_order(Side::BID, 10, "5");
        order.fill(
            Quantity::from_str("5").unwrap(),
            Decimal::from(45),
            tolerance(),
            Utc::now(),
        );

        assert_eq!(order.state, OrderState::DONE);
        // Residual is deliberately not swept to zero here.
        assert_eq!(order.locked, Decimal::from(5));
    }

    #[test]
    #[should_panic(expected = "Cannot fill terminal order")]
    fn test_fill_terminal_panics() {
        let mut order = limit_order(Side::ASK, 10, "5");
        order.fill(
            Quantity::from_str("5").unwrap(),
            Decimal::from(5),
            tolerance(),
            Utc::now(),
        );
        order.fill(
            Quantity::from_str("1").unwrap(),
            Decimal::ONE,
            tolerance(),
            Utc::now(),
        );
    }

    #[test]
    fn test_reservation_for() {
        let market = MarketId::new("BTC/USDT");
        let volume = Quantity::from_str("5").unwrap();
        let funds = Decimal::from(45);

        let ask = limit_order(Side::ASK, 9, "5");
        assert_eq!(ask.reservation_for(volume, funds), Decimal::from(5));

        let bid = limit_order(Side::BID, 10, "5");
        assert_eq!(bid.reservation_for(volume, funds), Decimal::from(50));

        let market_bid = Order::market(
            MemberId::new(),
            market,
            Side::BID,
            volume,
            Decimal::from(45),
            Utc::now(),
        );
        assert_eq!(market_bid.reservation_for(volume, funds), Decimal::from(45));
    }

    #[test]
    fn test_utility_fee_election() {
        let market = MarketId::new("BTC/USDT");

        let plain = limit_order(Side::BID, 10, "5");
        assert!(!plain.utility_fee_elected(&market));

        let elected = limit_order(Side::ASK, 10, "5").with_fee_currency(Currency::new("TRST"));
        assert!(elected.utility_fee_elected(&market));

        // Electing a pair currency is not a utility election.
        let in_pair = limit_order(Side::ASK, 10, "5").with_fee_currency(Currency::new("USDT"));
        assert!(!in_pair.utility_fee_elected(&market));
    }

    #[test]
    fn test_order_serialization() {
        let order = limit_order(Side::ASK, 3000, "2.5");
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(order.id, deserialized.id);
        assert_eq!(order.side, deserialized.side);
        assert_eq!(order.price, deserialized.price);
        assert!(json.contains("\"open\""));
    }
}
