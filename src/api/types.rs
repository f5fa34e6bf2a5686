//! Response types for the Polymarket Data API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Position entry from the /positions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    #[serde(default)]
    pub proxy_wallet: String,
    /// CLOB outcome-token id
    pub asset: String,
    pub condition_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    pub outcome: String,
    #[serde(default)]
    pub outcome_index: i32,
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub cur_price: Decimal,
    #[serde(default)]
    pub initial_value: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
    #[serde(default)]
    pub cash_pnl: Decimal,
    #[serde(default)]
    pub percent_pnl: Decimal,
}

/// Portfolio value from the /value endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueResponse {
    pub value: Decimal,
}
