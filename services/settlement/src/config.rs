//! Settlement service configuration

use rust_decimal::Decimal;
use std::time::Duration;

/// Tunables for the settlement engine.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Percentage fee taken from the asset each side receives.
    pub fee_rate: Decimal,
    /// Multiplier applied to the face fee when it is paid in an elected
    /// utility currency (0.5 = half price).
    pub utility_fee_discount: Decimal,
    /// Fixed decimal tolerance for volume/funds comparisons.
    pub tolerance: Decimal,
    /// Bounded wait for order/account locks before the settlement is
    /// abandoned as retryable contention.
    pub lock_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(2, 3),             // 0.2%
            utility_fee_discount: Decimal::new(5, 1), // 50%
            tolerance: Decimal::new(1, 12),
            lock_timeout: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let config = SettlementConfig::default();
        assert_eq!(config.fee_rate, Decimal::from_str_exact("0.002").unwrap());
        assert_eq!(
            config.utility_fee_discount,
            Decimal::from_str_exact("0.5").unwrap()
        );
    }
}
