//! Order gateway: the seam between the copy engine and the CLOB.
//!
//! Dry-run simulation lives entirely here; the engine runs the same code
//! path either way.

use std::sync::RwLock as StdRwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::{ClobClient, OrderSide, OrderType};
use crate::models::Position;

use super::TradingConfig;

/// Outcome of one buy/sell attempt.
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub success: bool,
    pub executed_size: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    pub error: Option<String>,
}

impl OrderFill {
    pub fn filled(size: Decimal, price: Decimal) -> Self {
        Self {
            success: true,
            executed_size: Some(size),
            executed_price: Some(price),
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            executed_size: None,
            executed_price: None,
            error: Some(reason.into()),
        }
    }

    /// Notional value of the fill, zero when nothing executed.
    pub fn notional(&self) -> Decimal {
        match (self.executed_size, self.executed_price) {
            (Some(size), Some(price)) => size * price,
            _ => Decimal::ZERO,
        }
    }
}

/// Places equivalent orders for tracked position changes.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Set up credentials/signing. Must succeed before live orders flow.
    async fn initialize(&self) -> Result<()>;

    /// Mirror a newly opened target position.
    async fn buy(&self, position: &Position) -> Result<OrderFill>;

    /// Unwind a previously mirrored position.
    async fn sell(&self, position: &Position) -> Result<OrderFill>;

    /// Informational wallet address, once initialized.
    fn wallet_address(&self) -> Option<String>;
}

/// Live gateway backed by the Polymarket CLOB.
pub struct ClobGateway {
    config: TradingConfig,
    client: RwLock<Option<ClobClient>>,
    wallet: StdRwLock<Option<String>>,
}

impl ClobGateway {
    pub fn new(config: TradingConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            wallet: StdRwLock::new(None),
        }
    }

    /// Size to copy for a target position, after multiplier and caps.
    ///
    /// Returns zero when the copy would fall below the minimum trade size.
    fn copy_size(&self, position: &Position) -> Decimal {
        if position.price.is_zero() {
            return Decimal::ZERO;
        }

        let mut size = position.size * self.config.position_multiplier;

        let cap = self.config.max_trade_size.min(self.config.max_position_size);
        if size * position.price > cap {
            size = cap / position.price;
        }

        if size * position.price < self.config.min_trade_size {
            return Decimal::ZERO;
        }

        size
    }

    async fn execute(&self, position: &Position, side: OrderSide) -> Result<OrderFill> {
        let size = self.copy_size(position);
        if size.is_zero() {
            debug!(
                position = %position.id,
                side = side.as_str(),
                "Copy size below minimum, not transmitting"
            );
            return Ok(OrderFill::rejected("copy size below minimum trade size"));
        }

        if self.config.dry_run {
            info!(
                market = %position.market_title,
                outcome = %position.outcome,
                side = side.as_str(),
                size = %size,
                price = %position.price,
                "[DRY RUN] Simulated order"
            );
            return Ok(OrderFill::filled(size, position.price));
        }

        let client = self.client.read().await;
        let client = client
            .as_ref()
            .context("Order gateway not initialized")?;

        // Price from the book, padded by the slippage tolerance.
        let price = match side {
            OrderSide::Buy => {
                let ask = client
                    .get_best_ask(&position.id)
                    .await?
                    .context("No asks available")?;
                ask * (Decimal::ONE + self.config.slippage_tolerance)
            }
            OrderSide::Sell => {
                let bid = client
                    .get_best_bid(&position.id)
                    .await?
                    .context("No bids available")?;
                bid * (Decimal::ONE - self.config.slippage_tolerance)
            }
        };

        let response = client
            .place_order(&position.id, side, size, price, OrderType::Fok)
            .await?;

        if response.success {
            info!(
                order_id = ?response.order_id,
                market = %position.market_title,
                side = side.as_str(),
                size = %size,
                price = %price,
                "Order placed"
            );
            Ok(OrderFill::filled(size, price))
        } else {
            Ok(OrderFill::rejected(response.error_msg))
        }
    }
}

#[async_trait]
impl OrderGateway for ClobGateway {
    async fn initialize(&self) -> Result<()> {
        let client = ClobClient::from_env().context("CLOB credentials not configured")?;
        let address = format!("{:?}", client.address());

        info!(address = %address, "Order gateway initialized");

        *self.wallet.write().expect("wallet lock poisoned") = Some(address);
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn buy(&self, position: &Position) -> Result<OrderFill> {
        self.execute(position, OrderSide::Buy).await
    }

    async fn sell(&self, position: &Position) -> Result<OrderFill> {
        self.execute(position, OrderSide::Sell).await
    }

    fn wallet_address(&self) -> Option<String> {
        self.wallet.read().expect("wallet lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(size: Decimal, price: Decimal) -> Position {
        Position {
            id: "7131".to_string(),
            market_id: "0xmarket".to_string(),
            market_title: "Test market".to_string(),
            outcome: "Yes".to_string(),
            size,
            price,
        }
    }

    fn dry_run_config() -> TradingConfig {
        TradingConfig {
            copy_enabled: true,
            dry_run: true,
            position_multiplier: dec!(0.1),
            max_position_size: dec!(500),
            max_trade_size: dec!(250),
            min_trade_size: dec!(1),
            ..TradingConfig::default()
        }
    }

    #[test]
    fn test_copy_size_applies_multiplier() {
        let gateway = ClobGateway::new(dry_run_config());
        // 10% of 1000 shares at 0.50 is 100 shares, $50 notional.
        assert_eq!(gateway.copy_size(&position(dec!(1000), dec!(0.5))), dec!(100));
    }

    #[test]
    fn test_copy_size_caps_at_max_trade_size() {
        let gateway = ClobGateway::new(dry_run_config());
        // 10% of 100k shares at 0.50 is $5000 notional, capped to $250.
        let size = gateway.copy_size(&position(dec!(100000), dec!(0.5)));
        assert_eq!(size * dec!(0.5), dec!(250));
    }

    #[test]
    fn test_copy_size_rejects_below_minimum() {
        let gateway = ClobGateway::new(dry_run_config());
        // 10% of 10 shares at 0.40 is $0.40 notional, under the $1 floor.
        assert_eq!(gateway.copy_size(&position(dec!(10), dec!(0.4))), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_dry_run_simulates_fill_without_client() {
        let gateway = ClobGateway::new(dry_run_config());

        let fill = gateway.buy(&position(dec!(1000), dec!(0.5))).await.unwrap();
        assert!(fill.success);
        assert_eq!(fill.executed_size, Some(dec!(100)));
        assert_eq!(fill.executed_price, Some(dec!(0.5)));
        assert_eq!(fill.notional(), dec!(50));
    }

    #[tokio::test]
    async fn test_below_minimum_copy_is_rejected_not_errored() {
        let gateway = ClobGateway::new(dry_run_config());

        let fill = gateway.buy(&position(dec!(10), dec!(0.4))).await.unwrap();
        assert!(!fill.success);
        assert!(fill.error.is_some());
        assert_eq!(fill.notional(), Decimal::ZERO);
    }
}
