//! Trading logic: configuration, order gateway, copy-trade engine.

mod config;
mod copy_engine;
mod order_gateway;

pub use config::TradingConfig;
pub use copy_engine::{CopyEngine, CopyStats};
pub use order_gateway::{ClobGateway, OrderFill, OrderGateway};
