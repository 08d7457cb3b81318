use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::OracleError;

/// Source of an external reference price for the instrument, consulted by
/// the market maker only when both sides of the book are empty.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn reference_price(&self) -> Result<Decimal, OracleError>;
}

/// Stand-in for a real price feed: answers with a fixed price after a short
/// simulated round trip.
pub struct SimulatedOracle {
    price: Decimal,
    latency: Duration,
}

impl SimulatedOracle {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            latency: Duration::from_millis(80),
        }
    }
}

#[async_trait]
impl PriceOracle for SimulatedOracle {
    async fn reference_price(&self) -> Result<Decimal, OracleError> {
        tokio::time::sleep(self.latency).await;
        Ok(self.price)
    }
}
