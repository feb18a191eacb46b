//! Fee policy
//!
//! By default a percentage fee is deducted from whatever asset a side
//! receives: the ask receives quote currency, the bid receives base.
//!
//! A side may instead elect a utility fee currency. The election is
//! eligible when the currency sits outside the traded pair, and feasible
//! when the side's utility account balance covers the discounted fee
//! (utility_fee_discount × the face fee). A feasible election debits the
//! utility account and leaves the received asset untouched; an infeasible
//! one silently falls back to the in-kind fee. Each side is evaluated
//! independently.

use crate::config::SettlementConfig;
use rust_decimal::Decimal;
use types::ids::{Currency, MarketId};
use types::order::Order;

/// Outcome of fee assessment for one side of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeAssessment {
    /// Fee owed by this side.
    pub fee_amount: Decimal,
    /// Currency the fee is collected in.
    pub fee_currency: Currency,
    /// True when the fee comes out of the elected utility account.
    pub paid_with_utility: bool,
    /// Amount of the matched asset this side actually receives.
    pub net_received: Decimal,
}

/// Computes the fee owed by each side of a match.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    rate: Decimal,
    utility_discount: Decimal,
}

impl FeePolicy {
    pub fn new(rate: Decimal, utility_discount: Decimal) -> Self {
        Self {
            rate,
            utility_discount,
        }
    }

    pub fn from_config(config: &SettlementConfig) -> Self {
        Self::new(config.fee_rate, config.utility_fee_discount)
    }

    /// Fee at face value, in units of the received asset.
    pub fn face_fee(&self, received: Decimal) -> Decimal {
        received * self.rate
    }

    /// Discounted fee owed when paying in a utility currency.
    pub fn utility_fee(&self, received: Decimal) -> Decimal {
        self.utility_discount * self.face_fee(received)
    }

    /// Assess one side. `utility_balance` is the balance of the side's
    /// elected utility account, if that account exists.
    pub fn assess(
        &self,
        order: &Order,
        market: &MarketId,
        received: Decimal,
        received_currency: Currency,
        utility_balance: Option<Decimal>,
    ) -> FeeAssessment {
        if order.utility_fee_elected(market) {
            let discounted = self.utility_fee(received);
            if let (Some(currency), Some(balance)) = (&order.fee_currency, utility_balance) {
                if balance >= discounted {
                    return FeeAssessment {
                        fee_amount: discounted,
                        fee_currency: currency.clone(),
                        paid_with_utility: true,
                        net_received: received,
                    };
                }
            }
        }

        let face = self.face_fee(received);
        FeeAssessment {
            fee_amount: face,
            fee_currency: received_currency,
            paid_with_utility: false,
            net_received: received - face,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::ids::MemberId;
    use types::numeric::{Price, Quantity};
    use types::order::Side;

    fn policy() -> FeePolicy {
        FeePolicy::from_config(&SettlementConfig::default())
    }

    fn ask_order(fee_currency: Option<&str>) -> Order {
        let order = Order::limit(
            MemberId::new(),
            MarketId::new("BTC/USDT"),
            Side::ASK,
            Price::from_u64(10),
            Quantity::from_str("5").unwrap(),
            Decimal::from(5),
            Utc::now(),
        );
        match fee_currency {
            Some(code) => order.with_fee_currency(Currency::new(code)),
            None => order,
        }
    }

    #[test]
    fn test_default_fee_is_in_kind() {
        let market = MarketId::new("BTC/USDT");
        let assessment = policy().assess(
            &ask_order(None),
            &market,
            Decimal::from(50),
            Currency::new("USDT"),
            None,
        );

        assert!(!assessment.paid_with_utility);
        assert_eq!(assessment.fee_currency, Currency::new("USDT"));
        assert_eq!(assessment.fee_amount, Decimal::from_str_exact("0.1").unwrap());
        assert_eq!(
            assessment.net_received,
            Decimal::from_str_exact("49.9").unwrap()
        );
    }

    #[test]
    fn test_utility_fee_feasibility_depends_on_balance() {
        let market = MarketId::new("BTC/USDT");
        let order = ask_order(Some("TRST"));

        // Discounted fee is 0.5 × 50 × 0.002 = 0.05.
        let broke = policy().assess(
            &order,
            &market,
            Decimal::from(50),
            Currency::new("USDT"),
            Some(Decimal::ZERO),
        );
        assert!(!broke.paid_with_utility);

        let funded = policy().assess(
            &order,
            &market,
            Decimal::from(50),
            Currency::new("USDT"),
            Some(Decimal::from_str_exact("0.5").unwrap()),
        );
        assert!(funded.paid_with_utility);
        assert_eq!(funded.fee_currency, Currency::new("TRST"));
        assert_eq!(funded.fee_amount, Decimal::from_str_exact("0.05").unwrap());
        assert_eq!(funded.net_received, Decimal::from(50));
    }

    #[test]
    fn test_missing_utility_account_falls_back() {
        let market = MarketId::new("BTC/USDT");
        let assessment = policy().assess(
            &ask_order(Some("TRST")),
            &market,
            Decimal::from(50),
            Currency::new("USDT"),
            None,
        );
        assert!(!assessment.paid_with_utility);
        assert_eq!(assessment.fee_currency, Currency::new("USDT"));
    }

    #[test]
    fn test_pair_currency_election_is_ineligible() {
        let market = MarketId::new("BTC/USDT");
        let assessment = policy().assess(
            &ask_order(Some("USDT")),
            &market,
            Decimal::from(50),
            Currency::new("USDT"),
            Some(Decimal::from(1000)),
        );
        assert!(!assessment.paid_with_utility);
    }
}
