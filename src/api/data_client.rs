//! Polymarket Data API client: read-only access to positions and
//! portfolio value for the tracked account.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{AccountSnapshot, Position};
use crate::tracker::SnapshotSource;

use super::types::{PositionResponse, ValueResponse};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_POSITIONS: u32 = 500;

/// Client for the Polymarket Data API.
pub struct DataClient {
    client: Client,
    base_url: String,
}

impl DataClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DATA_API_BASE.to_string())
    }

    /// Create with a custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch open positions for an account.
    pub async fn get_positions(&self, address: &str, limit: Option<u32>) -> Result<Vec<Position>> {
        let mut url = format!("{}/positions?user={}", self.base_url, address);
        if let Some(l) = limit {
            url = format!("{}&limit={}", url, l.min(MAX_POSITIONS));
        }

        debug!(url = %url, "Fetching positions");

        let items: Vec<PositionResponse> = self.get_json(&url, "positions").await?;

        let positions = items
            .into_iter()
            .map(|p| Position {
                id: p.asset,
                market_id: p.condition_id,
                market_title: p.title,
                outcome: p.outcome,
                size: p.size,
                price: p.cur_price,
            })
            .collect();

        Ok(positions)
    }

    /// Fetch the aggregate portfolio value for an account.
    pub async fn get_portfolio_value(&self, address: &str) -> Result<Decimal> {
        let url = format!("{}/value?user={}", self.base_url, address);

        debug!(url = %url, "Fetching portfolio value");

        let value: ValueResponse = self.get_json(&url, "value").await?;
        Ok(value.value)
    }

    /// GET a JSON document, retrying transient transport failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(Duration::from_secs(10)))
            .build();

        let response = backoff::future::retry(policy, || async {
            self.client
                .get(url)
                .send()
                .await
                .map_err(backoff::Error::transient)
        })
        .await
        .with_context(|| format!("Failed to fetch {}", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed: {} - {}", what, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

#[async_trait]
impl SnapshotSource for DataClient {
    async fn fetch_snapshot(&self, address: &str) -> Result<AccountSnapshot> {
        let (mut positions, total_value) = futures::future::try_join(
            self.get_positions(address, Some(MAX_POSITIONS)),
            self.get_portfolio_value(address),
        )
        .await?;

        // Ids must be unique within a snapshot; keep the first occurrence.
        let mut seen = HashSet::new();
        positions.retain(|p| seen.insert(p.id.clone()));

        Ok(AccountSnapshot {
            address: address.to_string(),
            positions,
            total_value,
            fetched_at: Utc::now(),
        })
    }
}
