//! Polymarket position-mirroring bot.
//!
//! Polls a target account's open positions and copies position changes
//! through the CLOB: newly opened position -> buy, closed position -> sell.

mod api;
mod models;
mod tracker;
mod trading;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::DataClient;
use crate::models::AccountSnapshot;
use crate::tracker::{PositionTracker, TrackerListener};
use crate::trading::{ClobGateway, CopyEngine, TradingConfig};

/// Polymarket position-mirror CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror a Polymarket account's open positions", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring the target account
    Run {
        /// Target account address to mirror
        #[arg(short, long, env = "MIRROR_TARGET_ADDRESS")]
        target: String,

        /// Polling interval in milliseconds
        #[arg(short, long, default_value = "30000", env = "MIRROR_POLL_INTERVAL_MS")]
        interval_ms: u64,

        /// Execute copy trades (observe-only without this flag)
        #[arg(long, env = "MIRROR_COPY_ENABLED")]
        copy: bool,

        /// Simulate order placement instead of transmitting real orders
        #[arg(long, env = "MIRROR_DRY_RUN")]
        dry_run: bool,

        /// Fraction of the target's position size to copy
        #[arg(long, default_value = "0.1")]
        multiplier: Decimal,

        /// Maximum notional per mirrored position in USDC
        #[arg(long, default_value = "500")]
        max_position_size: Decimal,

        /// Maximum notional per single order in USDC
        #[arg(long, default_value = "250")]
        max_trade_size: Decimal,

        /// Minimum notional per single order in USDC
        #[arg(long, default_value = "1")]
        min_trade_size: Decimal,

        /// Slippage tolerance for market orders (0.0 to 1.0)
        #[arg(long, default_value = "0.02")]
        slippage: Decimal,
    },

    /// Fetch and print the target's current open positions
    Status {
        /// Target account address
        #[arg(short, long, env = "MIRROR_TARGET_ADDRESS")]
        target: String,
    },

    /// Show the default configuration
    Config,
}

/// Prints accepted snapshots for observe-only consumers.
struct ConsoleListener;

#[async_trait]
impl TrackerListener for ConsoleListener {
    async fn on_update(&self, snapshot: &AccountSnapshot) {
        println!(
            "[{}] {} open positions, total ${:.2}",
            snapshot.fetched_at.format("%H:%M:%S"),
            snapshot.position_count(),
            snapshot.total_value
        );
    }

    async fn on_error(&self, error: &anyhow::Error) {
        warn!(error = %error, "Poll failed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            target,
            interval_ms,
            copy,
            dry_run,
            multiplier,
            max_position_size,
            max_trade_size,
            min_trade_size,
            slippage,
        } => {
            let config = TradingConfig {
                target_address: target.clone(),
                copy_enabled: copy,
                dry_run,
                poll_interval_ms: interval_ms,
                position_multiplier: multiplier,
                max_position_size,
                max_trade_size,
                min_trade_size,
                slippage_tolerance: slippage,
            };

            info!(
                target = %target,
                copy = copy,
                dry_run = dry_run,
                "Starting position mirror"
            );

            let source = Arc::new(DataClient::new()?);
            let tracker = Arc::new(PositionTracker::new(
                source,
                target.clone(),
                config.poll_interval(),
            ));
            tracker.add_listener(Arc::new(ConsoleListener)).await;

            let gateway = Arc::new(ClobGateway::new(config.clone()));
            let engine = Arc::new(CopyEngine::new(
                config.clone(),
                Arc::clone(&tracker),
                gateway,
            ));

            println!("\n=== Polymarket Position Mirror ===");
            println!("Target:           {}", target);
            println!("Polling interval: {}ms", config.poll_interval().as_millis());
            println!(
                "Mode:             {}{}",
                if copy { "COPY-TRADING" } else { "OBSERVE ONLY" },
                if dry_run { " (dry run)" } else { "" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            Arc::clone(&engine).start().await?;

            tokio::signal::ctrl_c().await?;
            println!("\nStopping...");
            engine.stop().await;

            let stats = engine.get_stats().await;
            println!("\n{}", stats);
        }

        Commands::Status { target } => {
            let source = Arc::new(DataClient::new()?);
            let tracker = PositionTracker::new(
                source,
                target.clone(),
                TradingConfig::default().poll_interval(),
            );

            let status = tracker.get_status().await?;

            println!("\n=== {} ===", target);
            println!("Monitoring:     {}", if status.is_monitoring { "Yes" } else { "No" });
            println!(
                "Last poll:      {}",
                status
                    .last_poll_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "Never".to_string())
            );
            println!("Total value:    ${:.2}", status.snapshot.total_value);
            println!("Open positions: {}", status.snapshot.position_count());

            if !status.snapshot.positions.is_empty() {
                println!(
                    "\n{:<40} {:<8} {:>12} {:>8} {:>10}",
                    "MARKET", "OUTCOME", "SIZE", "PRICE", "VALUE"
                );
                println!("{}", "-".repeat(83));
                for pos in &status.snapshot.positions {
                    println!(
                        "{:<40} {:<8} {:>12} {:>8.3} {:>10.2}",
                        truncate(&pos.market_title, 38),
                        pos.outcome,
                        pos.size,
                        pos.price,
                        pos.notional_value()
                    );
                }
            }
        }

        Commands::Config => {
            let config = TradingConfig::default();

            println!("\n=== Mirror Configuration (defaults) ===\n");
            println!("Poll Interval:       {}ms", config.poll_interval_ms);
            println!("Copy Trading:        {}", config.copy_enabled);
            println!("Dry Run:             {}", config.dry_run);
            println!("Position Multiplier: {}", config.position_multiplier);
            println!("Max Position Size:   ${}", config.max_position_size);
            println!("Max Trade Size:      ${}", config.max_trade_size);
            println!("Min Trade Size:      ${}", config.min_trade_size);
            println!(
                "Slippage Tolerance:  {}%",
                config.slippage_tolerance * Decimal::from(100)
            );
        }
    }

    Ok(())
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
