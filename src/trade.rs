use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::{Order, Side};

/// The public record of an execution, appended to the book's trade log.
///
/// - `price` comes from the maker's level (the resting side).
/// - `taker_side` is the side of the incoming order that triggered the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: Decimal,
    pub size: Decimal,
    pub taker_side: Side,
    pub timestamp: SystemTime,
}

/// The bilateral record of two orders exchanging quantity at a price.
///
/// `bid` and `ask` are by-value snapshots taken *after* the fill, so the
/// maker side's `size` is its remaining quantity (zero when fully consumed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub bid: Order,
    pub ask: Order,
    pub size_filled: Decimal,
    pub price: Decimal,
}

impl Match {
    /// The resting party of this match, given the side of the incoming order.
    pub fn maker(&self, taker_side: Side) -> &Order {
        match taker_side {
            Side::Bid => &self.ask,
            Side::Ask => &self.bid,
        }
    }
}
