//! Aggressive order flow for exercising the market maker's quotes.
//!
//! Sends a market order on a random side at a fixed rate, so both sides of
//! the maker's two-sided quote get hit, and tallies the taker's inventory
//! and realised P&L from the returned matches:
//!
//! - a market **bid** buys from the maker: inventory up, cash out
//! - a market **ask** sells to the maker: inventory down, cash in
//!
//! An insufficient-liquidity rejection is expected while the maker is still
//! seeding an empty book, so it is logged and skipped rather than fatal.

use std::time::{Duration, Instant};

use rand::Rng;
use rust_decimal::Decimal;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{ExchangeClient, PlaceOrderParams};
use crate::errors::{ClientError, EngineError};
use crate::orders::Side;

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub user_id: u64,
    pub order_size: Decimal,
    /// Market orders per second.
    pub rate_hz: u64,
    /// Total duration of the run.
    pub run_secs: u64,
}

/// Fire market orders until the duration elapses or `shutdown` fires.
pub async fn run_flow<C: ExchangeClient>(
    client: &C,
    cfg: FlowConfig,
    shutdown: CancellationToken,
) -> Result<(), ClientError> {
    info!(
        user_id = cfg.user_id,
        order_size = %cfg.order_size,
        rate_hz = cfg.rate_hz,
        run_secs = cfg.run_secs,
        "starting order flow"
    );

    let period_ms = (1000 / cfg.rate_hz.max(1)).max(1);
    let mut tick = interval(Duration::from_millis(period_ms));
    let start = Instant::now();
    let mut inventory = Decimal::ZERO;
    let mut realized_pnl = Decimal::ZERO;

    while start.elapsed().as_secs() < cfg.run_secs {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {}
        }

        let side = if rand::rng().random_bool(0.5) {
            Side::Bid
        } else {
            Side::Ask
        };
        let params = PlaceOrderParams {
            user_id: cfg.user_id,
            side,
            size: cfg.order_size,
            price: None,
        };
        match client.place_market(params).await {
            Ok(matches) => {
                for m in &matches {
                    let notional = m.price * m.size_filled;
                    match side {
                        Side::Bid => {
                            inventory += m.size_filled;
                            realized_pnl -= notional;
                        }
                        Side::Ask => {
                            inventory -= m.size_filled;
                            realized_pnl += notional;
                        }
                    }
                }
            }
            Err(ClientError::Engine(EngineError::InsufficientLiquidity { .. }))
            | Err(ClientError::Api { status: 422, .. }) => {
                warn!(side = ?side, "book too thin for market order, skipping");
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        inventory = %inventory,
        realized_pnl = %realized_pnl,
        "order flow finished"
    );
    Ok(())
}
