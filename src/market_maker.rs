use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::{ExchangeClient, PlaceOrderParams};
use crate::errors::MarketMakerError;
use crate::oracle::PriceOracle;
use crate::orders::{OrderId, Side};

/// Configuration for the [`MarketMaker`].
#[derive(Debug, Clone)]
pub struct MakerConfig {
    /// Identity the maker's orders are submitted under.
    pub user_id: u64,
    /// Quantity per posted quote.
    pub order_size: Decimal,
    /// Spread at or below which no new quotes are posted.
    pub min_spread: Decimal,
    /// Distance from the reference price when seeding an empty book.
    pub seed_offset: Decimal,
    /// Distance by which a posted quote improves on the observed best.
    pub price_offset: Decimal,
    /// Period between quoting ticks.
    pub make_interval: Duration,
}

/// Maintains a two-sided quote around the prevailing mid.
///
/// Each tick reads the best bid and ask, seeds an empty book from the
/// oracle, synthesises a missing side, and otherwise posts a quote one
/// offset inside each best. Quote ids are remembered so stale quotes can be
/// cancelled when replacements go out; a stale id that is already gone was
/// filled in the meantime and is not an error.
pub struct MarketMaker<C, O> {
    cfg: MakerConfig,
    client: C,
    oracle: O,
    outstanding: Vec<OrderId>,
}

impl<C: ExchangeClient, O: PriceOracle> MarketMaker<C, O> {
    pub fn new(cfg: MakerConfig, client: C, oracle: O) -> Self {
        Self {
            cfg,
            client,
            oracle,
            outstanding: Vec::new(),
        }
    }

    /// Run the quoting loop until `shutdown` fires or a client or oracle
    /// error occurs. Errors terminate the loop rather than retrying, so a
    /// fault cannot compound; operators restart the maker externally.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            user_id = self.cfg.user_id,
            order_size = %self.cfg.order_size,
            min_spread = %self.cfg.min_spread,
            price_offset = %self.cfg.price_offset,
            interval_ms = self.cfg.make_interval.as_millis() as u64,
            "starting market maker"
        );
        let mut interval = tokio::time::interval(self.cfg.make_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("market maker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.quote_once().await {
                        error!(error = %err, "market maker terminating");
                        break;
                    }
                }
            }
        }
    }

    /// A single quoting tick.
    pub async fn quote_once(&mut self) -> Result<(), MarketMakerError> {
        let mut bid = self.client.best_bid().await?.price;
        let mut ask = self.client.best_ask().await?.price;

        if bid.is_zero() && ask.is_zero() {
            return self.seed_book().await;
        }

        // synthesise a missing side from the known one
        let two = Decimal::from(2);
        if bid.is_zero() {
            bid = ask - self.cfg.price_offset * two;
        }
        if ask.is_zero() {
            ask = bid + self.cfg.price_offset * two;
        }

        let spread = ask - bid;
        if spread <= self.cfg.min_spread {
            debug!(spread = %spread, "spread too tight, holding quotes");
            return Ok(());
        }

        self.cancel_outstanding().await?;
        self.place_quote(Side::Bid, bid + self.cfg.price_offset)
            .await?;
        self.place_quote(Side::Ask, ask - self.cfg.price_offset)
            .await?;
        Ok(())
    }

    async fn seed_book(&mut self) -> Result<(), MarketMakerError> {
        let reference = self.oracle.reference_price().await?;
        info!(
            reference = %reference,
            seed_offset = %self.cfg.seed_offset,
            "book empty, seeding quotes"
        );
        self.place_quote(Side::Bid, reference - self.cfg.seed_offset)
            .await?;
        self.place_quote(Side::Ask, reference + self.cfg.seed_offset)
            .await?;
        Ok(())
    }

    async fn cancel_outstanding(&mut self) -> Result<(), MarketMakerError> {
        for id in std::mem::take(&mut self.outstanding) {
            match self.client.cancel(id).await {
                Ok(()) => {}
                // already gone: the quote was filled since the last tick
                Err(err) if err.is_unknown_order() => {
                    debug!(order_id = %id, "stale quote already filled");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn place_quote(&mut self, side: Side, price: Decimal) -> Result<(), MarketMakerError> {
        let id = self
            .client
            .place_limit(PlaceOrderParams {
                user_id: self.cfg.user_id,
                side,
                size: self.cfg.order_size,
                price: Some(price),
            })
            .await?;
        self.outstanding.push(id);
        Ok(())
    }
}
