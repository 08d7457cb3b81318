use rust_decimal::Decimal;
use thiserror::Error;

use crate::orders::OrderId;

/// Failures surfaced by [`crate::orderbook::OrderBook`] operations.
///
/// Every engine operation is atomic: on failure the book is exactly as it
/// was before the call and no trade has been appended.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("not enough volume [available: {available}] for market order [size: {requested}]")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },

    #[error("unknown order: {id}")]
    UnknownOrder { id: OrderId },
}

/// Failures surfaced by an [`crate::client::ExchangeClient`].
///
/// The in-process client only ever produces `Engine` values; the HTTP client
/// adds transport faults and decoded API rejections.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// True when the error means "that order is not resting", regardless of
    /// whether it came back in-process or over HTTP.
    pub fn is_unknown_order(&self) -> bool {
        matches!(
            self,
            ClientError::Engine(EngineError::UnknownOrder { .. })
                | ClientError::Api { status: 404, .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("reference price unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum MarketMakerError {
    #[error("exchange client error: {0}")]
    Client(#[from] ClientError),

    #[error("price oracle error: {0}")]
    Oracle(#[from] OracleError),
}
