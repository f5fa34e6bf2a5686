//! Polymarket API clients for position data and order execution.

mod clob_client;
mod data_client;
mod types;

pub use clob_client::{ClobClient, OrderResponse, OrderSide, OrderType};
pub use data_client::DataClient;
pub use types::*;
