use std::fmt;
use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque order identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which side of the market an order is on.
///
/// Bids are sorted from **highest to lowest price** (a higher price is a more
/// aggressive buy), asks from **lowest to highest** (a lower price is a more
/// aggressive sell), so matching always consumes the best price first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// The side an incoming order on `self` matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Whether an order rests at a price or consumes liquidity immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// An order submitted by a trader.
///
/// `size` is the *remaining* quantity: it is decremented as the order fills,
/// and a size of zero means the order is done. The creation `timestamp` is
/// retained across partial fills, so a partially consumed resting order keeps
/// its place in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: u64,
    pub side: Side,
    pub size: Decimal,
    pub timestamp: SystemTime,
}

impl Order {
    pub fn new(side: Side, size: Decimal, user_id: u64) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            side,
            size,
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.size.is_zero()
    }
}
