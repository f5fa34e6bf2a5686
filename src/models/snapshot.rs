//! Account snapshot: the full set of open positions at one poll instant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Position;

/// All open positions of one account at one point in time.
///
/// Position ids are unique within a snapshot; the data client enforces
/// this when it builds one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Tracked account address
    pub address: String,

    /// Open positions at fetch time
    pub positions: Vec<Position>,

    /// Aggregate portfolio value in USDC
    pub total_value: Decimal,

    /// When this snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl AccountSnapshot {
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Index positions by id for diffing.
    pub fn position_map(&self) -> HashMap<String, Position> {
        self.positions
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect()
    }

    /// Look up a position by id.
    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }
}
