//! Position model representing one open stake in the target account.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One open stake in a prediction-market outcome.
///
/// Positions are immutable snapshot values: each poll replaces them
/// wholesale, nothing mutates them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// CLOB outcome-token id, unique per market+outcome
    pub id: String,

    /// Market condition ID
    pub market_id: String,

    /// Market question for display
    #[serde(default)]
    pub market_title: String,

    /// Outcome token held (e.g., "Yes", "No")
    pub outcome: String,

    /// Number of outcome tokens held
    pub size: Decimal,

    /// Current price per token in USDC (0.0 to 1.0)
    pub price: Decimal,
}

impl Position {
    /// Current USDC value of the stake.
    pub fn notional_value(&self) -> Decimal {
        self.size * self.price
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({} @ {})",
            self.market_title, self.outcome, self.size, self.price
        )
    }
}
