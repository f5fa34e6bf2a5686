//! Mirror-trading configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::tracker::MIN_POLL_INTERVAL;

/// Configuration for the tracker and copy-trade engine.
///
/// The sizing and slippage knobs are passed through to the order gateway;
/// the core never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Address of the account being mirrored
    pub target_address: String,

    /// Whether to execute copy trades at all (observe-only when false)
    pub copy_enabled: bool,

    /// Simulate order placement instead of transmitting real orders
    pub dry_run: bool,

    /// Polling interval in milliseconds (clamped to a 1000 ms floor)
    pub poll_interval_ms: u64,

    /// Fraction of the target's size to copy
    pub position_multiplier: Decimal,

    /// Maximum notional per mirrored position in USDC
    pub max_position_size: Decimal,

    /// Maximum notional per single order in USDC
    pub max_trade_size: Decimal,

    /// Minimum notional per single order in USDC
    pub min_trade_size: Decimal,

    /// Slippage tolerance for market orders (0.0 to 1.0)
    pub slippage_tolerance: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            target_address: String::new(),
            copy_enabled: false,
            dry_run: false,
            poll_interval_ms: 30_000,
            position_multiplier: dec!(0.1), // Copy 10% of the target's size
            max_position_size: dec!(500.0),
            max_trade_size: dec!(250.0),
            min_trade_size: dec!(1.0),
            slippage_tolerance: dec!(0.02),
        }
    }
}

impl TradingConfig {
    /// Poll interval with the floor applied.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }
}
