use std::collections::{btree_map, BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::EngineError;
use crate::level::PriceLevel;
use crate::orders::{Order, OrderId, Side};
use crate::trade::{Match, Trade};

/// By-value snapshot of the best level on one side. A `price` of zero means
/// that side of the book is empty; the market maker keys off this sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub total_volume: Decimal,
}

impl Quote {
    pub fn empty() -> Self {
        Self {
            price: Decimal::ZERO,
            total_volume: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_zero()
    }
}

/// Aggregated `(price, volume)` pairs per side, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Unifies forward (`Iter`) and reverse (`Rev<Iter>`) traversal of the level
/// map, so both sides expose a single priority-ordered iterator type.
enum EitherIter<'a> {
    /// Ascending prices, best ask first.
    Fwd(btree_map::Iter<'a, Decimal, PriceLevel>),
    /// Descending prices, best bid first.
    Rev(std::iter::Rev<btree_map::Iter<'a, Decimal, PriceLevel>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = &'a PriceLevel;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(iter) => iter.next().map(|(_, level)| level),
            EitherIter::Rev(iter) => iter.next().map(|(_, level)| level),
        }
    }
}

/// All price levels on one side, keyed by price.
///
/// The ordered map is simultaneously the by-price index and the priority
/// order: asks iterate ascending, bids descending. Best-of is the first
/// element of the priority iteration; insert and evict are O(log L).
#[derive(Debug, Clone)]
pub struct SideBook {
    side: Side,
    levels: BTreeMap<Decimal, PriceLevel>,
}

impl SideBook {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Level at `price`, created empty if absent.
    pub fn get_or_create(&mut self, price: Decimal) -> &mut PriceLevel {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
    }

    pub fn get_mut(&mut self, price: Decimal) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Drop the level at `price`. Called exactly when the level empties.
    pub fn evict(&mut self, price: Decimal) {
        self.levels.remove(&price);
    }

    /// Levels in priority order, best first.
    pub fn iter_priority(&self) -> impl Iterator<Item = &PriceLevel> {
        match self.side {
            Side::Ask => EitherIter::Fwd(self.levels.iter()),
            Side::Bid => EitherIter::Rev(self.levels.iter().rev()),
        }
    }

    pub fn best(&self) -> Option<&PriceLevel> {
        self.iter_priority().next()
    }

    pub fn best_price(&self) -> Option<Decimal> {
        self.best().map(PriceLevel::price)
    }

    pub fn total_volume(&self) -> Decimal {
        self.levels.values().map(PriceLevel::total_volume).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Non-owning handle from a resting order back to its level: one hash lookup
/// to here, one tree lookup to the level.
#[derive(Debug, Clone, Copy)]
struct RestingRef {
    side: Side,
    price: Decimal,
}

/// A continuous limit-order book for a single instrument.
///
/// Two [`SideBook`]s hold the resting orders; `index` covers exactly the
/// resting set, and `trades` is the append-only execution log. Prices are
/// exact decimals, so equal prices coalesce into one level without any
/// floating-point tick-grid caveats.
///
/// The book itself is a plain value: callers that share it across threads
/// wrap it in a [`SharedBook`] and route writes through the write guard.
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: SideBook,
    asks: SideBook,
    index: HashMap<OrderId, RestingRef>,
    trades: Vec<Trade>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: SideBook::new(Side::Bid),
            asks: SideBook::new(Side::Ask),
            index: HashMap::new(),
            trades: Vec::new(),
        }
    }

    fn book_side(&self, side: Side) -> &SideBook {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Rest `order` at `price`. No crossing check is performed against the
    /// opposite side: limit orders never aggress, callers wanting immediate
    /// execution submit market orders.
    pub fn place_limit(&mut self, price: Decimal, order: Order) -> Result<(), EngineError> {
        if order.size <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                reason: format!("size must be positive, got {}", order.size),
            });
        }
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                reason: format!("price must be positive, got {price}"),
            });
        }
        if self.index.contains_key(&order.id) {
            return Err(EngineError::InvalidOrder {
                reason: format!("duplicate order id: {}", order.id),
            });
        }

        info!(
            price = %price,
            side = ?order.side,
            size = %order.size,
            user_id = order.user_id,
            "new limit order"
        );

        self.index.insert(
            order.id,
            RestingRef {
                side: order.side,
                price,
            },
        );
        match order.side {
            Side::Bid => self.bids.get_or_create(price).add(order),
            Side::Ask => self.asks.get_or_create(price).add(order),
        }
        Ok(())
    }

    /// Consume liquidity from the opposite side, best price first, FIFO
    /// within each level. Fails with `InsufficientLiquidity` before touching
    /// the book when the order is larger than the opposite side's volume.
    pub fn place_market(&mut self, mut order: Order) -> Result<Vec<Match>, EngineError> {
        if order.size <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                reason: format!("size must be positive, got {}", order.size),
            });
        }
        let taker_side = order.side;
        let available = self.book_side(taker_side.opposite()).total_volume();
        if order.size > available {
            return Err(EngineError::InsufficientLiquidity {
                requested: order.size,
                available,
            });
        }

        info!(
            side = ?taker_side,
            size = %order.size,
            user_id = order.user_id,
            "new market order"
        );

        let timestamp = SystemTime::now();
        let mut matches = Vec::new();

        while order.size > Decimal::ZERO {
            let opposite = match taker_side {
                Side::Bid => &mut self.asks,
                Side::Ask => &mut self.bids,
            };
            let Some(price) = opposite.best_price() else {
                break;
            };
            let Some(level) = opposite.get_mut(price) else {
                break;
            };
            let level_matches = level.fill(&mut order);
            if level.is_empty() {
                opposite.evict(price);
            }
            for m in &level_matches {
                let maker = m.maker(taker_side);
                if maker.is_filled() {
                    self.index.remove(&maker.id);
                }
            }
            matches.extend(level_matches);
        }

        for m in &matches {
            self.trades.push(Trade {
                price: m.price,
                size: m.size_filled,
                taker_side,
                timestamp,
            });
        }
        if let Some(last) = self.trades.last() {
            info!(current_price = %last.price, fills = matches.len(), "market order executed");
        }

        Ok(matches)
    }

    /// Remove a resting order. The level is fetched through the index handle
    /// and evicted if the removal empties it.
    pub fn cancel(&mut self, id: OrderId) -> Result<(), EngineError> {
        let Some(handle) = self.index.get(&id).copied() else {
            return Err(EngineError::UnknownOrder { id });
        };
        let book_side = match handle.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let Some(level) = book_side.get_mut(handle.price) else {
            return Err(EngineError::UnknownOrder { id });
        };
        let Some(order) = level.remove(id) else {
            return Err(EngineError::UnknownOrder { id });
        };
        if level.is_empty() {
            book_side.evict(handle.price);
        }
        self.index.remove(&id);

        info!(
            order_id = %id,
            side = ?order.side,
            size = %order.size,
            "order cancelled"
        );
        Ok(())
    }

    pub fn best_bid(&self) -> Quote {
        Self::quote_of(self.bids.best())
    }

    pub fn best_ask(&self) -> Quote {
        Self::quote_of(self.asks.best())
    }

    fn quote_of(level: Option<&PriceLevel>) -> Quote {
        level.map_or_else(Quote::empty, |l| Quote {
            price: l.price(),
            total_volume: l.total_volume(),
        })
    }

    pub fn bid_total_volume(&self) -> Decimal {
        self.bids.total_volume()
    }

    pub fn ask_total_volume(&self) -> Decimal {
        self.asks.total_volume()
    }

    /// Whether the order with `id` is currently resting.
    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn snapshot(&self) -> BookSnapshot {
        let aggregate =
            |side: &SideBook| -> Vec<(Decimal, Decimal)> {
                side.iter_priority()
                    .map(|l| (l.price(), l.total_volume()))
                    .collect()
            };
        BookSnapshot {
            bids: aggregate(&self.bids),
            asks: aggregate(&self.asks),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// The book behind a reader-writer lock: mutations take the write guard for
/// their full duration, reads take the shared guard and copy values out.
pub type SharedBook = Arc<RwLock<OrderBook>>;

pub fn shared_book() -> SharedBook {
    Arc::new(RwLock::new(OrderBook::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use rust_decimal_macros::dec;

    fn place(ob: &mut OrderBook, side: Side, price: Decimal, size: Decimal) -> OrderId {
        let order = Order::new(side, size, 1);
        let id = order.id;
        ob.place_limit(price, order).unwrap();
        id
    }

    /// Checks the structural invariants that must hold after every
    /// successful operation.
    fn assert_consistent(ob: &OrderBook) {
        for side in [&ob.bids, &ob.asks] {
            for level in side.iter_priority() {
                assert!(!level.is_empty(), "reachable level must not be empty");
                let sum: Decimal = level.iter().map(|o| o.size).sum();
                assert_eq!(level.total_volume(), sum);
                for order in level.iter() {
                    let handle = ob.index.get(&order.id).expect("resting order indexed");
                    assert_eq!(handle.side, side.side());
                    assert_eq!(handle.price, level.price());
                    assert!(order.size > Decimal::ZERO);
                }
            }
            let side_sum: Decimal = side.iter_priority().map(|l| l.total_volume()).sum();
            assert_eq!(side.total_volume(), side_sum);
        }
        let resting: usize = [&ob.bids, &ob.asks]
            .iter()
            .flat_map(|s| s.iter_priority())
            .map(|l| l.order_count())
            .sum();
        assert_eq!(ob.index.len(), resting);

        // priority: best ask is the minimum ask price, best bid the maximum bid
        let ask_prices: Vec<_> = ob.asks.iter_priority().map(|l| l.price()).collect();
        assert!(ask_prices.windows(2).all(|w| w[0] < w[1]));
        let bid_prices: Vec<_> = ob.bids.iter_priority().map(|l| l.price()).collect();
        assert!(bid_prices.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn market_bid_partially_fills_resting_ask() {
        let mut ob = OrderBook::new();
        let ask = place(&mut ob, Side::Ask, dec!(10_000), dec!(20));

        let matches = ob.place_market(Order::new(Side::Bid, dec!(10), 2)).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ask.id, ask);
        assert_eq!(matches[0].size_filled, dec!(10));
        assert_eq!(matches[0].price, dec!(10_000));
        assert!(matches[0].bid.is_filled());

        assert_eq!(ob.ask_total_volume(), dec!(10));
        assert_eq!(ob.best_ask(), Quote { price: dec!(10_000), total_volume: dec!(10) });
        assert_eq!(ob.trades().len(), 1);
        assert_eq!(ob.trades()[0].price, dec!(10_000));
        assert_eq!(ob.trades()[0].size, dec!(10));
        assert_eq!(ob.trades()[0].taker_side, Side::Bid);
        assert_consistent(&ob);
    }

    #[test]
    fn market_ask_sweeps_best_bid_levels_first() {
        let mut ob = OrderBook::new();
        let c = place(&mut ob, Side::Bid, dec!(5_000), dec!(1));
        let d = place(&mut ob, Side::Bid, dec!(5_000), dec!(1));
        let b = place(&mut ob, Side::Bid, dec!(9_000), dec!(8));
        let a = place(&mut ob, Side::Bid, dec!(10_000), dec!(5));
        assert_eq!(ob.bid_total_volume(), dec!(15));

        let matches = ob.place_market(Order::new(Side::Ask, dec!(10), 2)).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].bid.id, a);
        assert_eq!(matches[0].size_filled, dec!(5));
        assert_eq!(matches[0].price, dec!(10_000));
        assert_eq!(matches[1].bid.id, b);
        assert_eq!(matches[1].size_filled, dec!(5));
        assert_eq!(matches[1].price, dec!(9_000));

        // conservation: fills sum to the incoming size
        let filled: Decimal = matches.iter().map(|m| m.size_filled).sum();
        assert_eq!(filled, dec!(10));

        assert_eq!(ob.bid_total_volume(), dec!(5));
        assert_eq!(ob.bids.level_count(), 2);
        assert_eq!(ob.best_bid(), Quote { price: dec!(9_000), total_volume: dec!(3) });
        assert!(!ob.contains(a), "fully consumed maker leaves the index");
        assert!(ob.contains(b), "partially filled maker stays resting");
        assert!(ob.contains(c) && ob.contains(d));
        assert_consistent(&ob);
    }

    #[test]
    fn fifo_within_a_level() {
        let mut ob = OrderBook::new();
        let first = place(&mut ob, Side::Ask, dec!(100), dec!(4));
        let second = place(&mut ob, Side::Ask, dec!(100), dec!(6));

        let matches = ob.place_market(Order::new(Side::Bid, dec!(9), 2)).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].ask.id, first);
        assert_eq!(matches[0].size_filled, dec!(4));
        assert_eq!(matches[1].ask.id, second);
        assert_eq!(matches[1].size_filled, dec!(5));
        assert_eq!(ob.best_ask().total_volume, dec!(1));
        assert_consistent(&ob);
    }

    #[test]
    fn partial_fill_keeps_time_priority() {
        let mut ob = OrderBook::new();
        let first = place(&mut ob, Side::Ask, dec!(100), dec!(5));
        let second = place(&mut ob, Side::Ask, dec!(100), dec!(5));

        // shave the head order without finishing it
        ob.place_market(Order::new(Side::Bid, dec!(3), 2)).unwrap();
        let matches = ob.place_market(Order::new(Side::Bid, dec!(4), 2)).unwrap();

        // the shaved order still fills before the later one
        assert_eq!(matches[0].ask.id, first);
        assert_eq!(matches[0].size_filled, dec!(2));
        assert_eq!(matches[1].ask.id, second);
        assert_eq!(matches[1].size_filled, dec!(2));
        assert_consistent(&ob);
    }

    #[test]
    fn cancel_removes_order_and_evicts_level() {
        let mut ob = OrderBook::new();
        let ask = place(&mut ob, Side::Ask, dec!(10_000), dec!(4));
        assert_eq!(ob.ask_total_volume(), dec!(4));

        ob.cancel(ask).unwrap();

        assert_eq!(ob.ask_total_volume(), Decimal::ZERO);
        assert!(!ob.contains(ask));
        assert!(ob.asks.is_empty(), "emptied level is evicted");
        assert_consistent(&ob);
    }

    #[test]
    fn cancel_twice_fails_with_unknown_order() {
        let mut ob = OrderBook::new();
        let bid = place(&mut ob, Side::Bid, dec!(100), dec!(2));

        ob.cancel(bid).unwrap();
        assert_eq!(ob.cancel(bid), Err(EngineError::UnknownOrder { id: bid }));
    }

    #[test]
    fn cancel_of_unknown_id_fails() {
        let mut ob = OrderBook::new();
        let id = OrderId::new();
        assert_eq!(ob.cancel(id), Err(EngineError::UnknownOrder { id }));
    }

    #[test]
    fn best_quotes_use_zero_sentinel_on_empty_sides() {
        let mut ob = OrderBook::new();
        assert!(ob.best_bid().is_empty());
        assert!(ob.best_ask().is_empty());

        place(&mut ob, Side::Bid, dec!(100), dec!(1));

        assert_eq!(ob.best_bid().price, dec!(100));
        assert_eq!(ob.best_ask().price, Decimal::ZERO);
    }

    #[test]
    fn oversized_market_order_leaves_book_untouched() {
        let mut ob = OrderBook::new();
        let ask = place(&mut ob, Side::Ask, dec!(10_000), dec!(5));

        let err = ob
            .place_market(Order::new(Side::Bid, dec!(10), 2))
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientLiquidity {
                requested: dec!(10),
                available: dec!(5),
            }
        );
        assert!(ob.contains(ask));
        assert_eq!(ob.ask_total_volume(), dec!(5));
        assert!(ob.trades().is_empty());
        assert_consistent(&ob);
    }

    #[test]
    fn market_order_may_drain_the_whole_side() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Ask, dec!(100), dec!(5));

        let matches = ob.place_market(Order::new(Side::Bid, dec!(5), 2)).unwrap();

        assert_eq!(matches.len(), 1);
        assert!(ob.asks.is_empty());
        assert!(ob.best_ask().is_empty());
        assert_consistent(&ob);
    }

    #[test]
    fn place_limit_rejects_bad_input() {
        let mut ob = OrderBook::new();

        let zero = Order::new(Side::Bid, Decimal::ZERO, 1);
        assert!(matches!(
            ob.place_limit(dec!(100), zero),
            Err(EngineError::InvalidOrder { .. })
        ));

        let order = Order::new(Side::Bid, dec!(1), 1);
        assert!(matches!(
            ob.place_limit(dec!(-5), order),
            Err(EngineError::InvalidOrder { .. })
        ));

        let order = Order::new(Side::Bid, dec!(1), 1);
        let dup = order.clone();
        ob.place_limit(dec!(100), order).unwrap();
        assert!(matches!(
            ob.place_limit(dec!(101), dup),
            Err(EngineError::InvalidOrder { .. })
        ));
        assert_consistent(&ob);
    }

    #[test]
    fn place_market_rejects_non_positive_size() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Ask, dec!(100), dec!(5));

        let err = ob
            .place_market(Order::new(Side::Bid, Decimal::ZERO, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder { .. }));
        assert_eq!(ob.ask_total_volume(), dec!(5));
    }

    #[test]
    fn limit_orders_do_not_cross() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Bid, dec!(100), dec!(5));
        // an ask below the best bid rests instead of matching
        place(&mut ob, Side::Ask, dec!(90), dec!(5));

        assert!(ob.trades().is_empty());
        assert_eq!(ob.best_bid().price, dec!(100));
        assert_eq!(ob.best_ask().price, dec!(90));
        assert_consistent(&ob);
    }

    #[test]
    fn equal_prices_coalesce_into_one_level() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Bid, dec!(99.95), dec!(1));
        place(&mut ob, Side::Bid, dec!(99.95), dec!(2));

        assert_eq!(ob.bids.level_count(), 1);
        assert_eq!(ob.best_bid(), Quote { price: dec!(99.95), total_volume: dec!(3) });
    }

    #[test]
    fn trade_log_timestamps_are_non_decreasing() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Ask, dec!(100), dec!(10));
        place(&mut ob, Side::Ask, dec!(101), dec!(10));

        ob.place_market(Order::new(Side::Bid, dec!(5), 2)).unwrap();
        ob.place_market(Order::new(Side::Bid, dec!(8), 2)).unwrap();
        ob.place_market(Order::new(Side::Bid, dec!(7), 2)).unwrap();

        let stamps: Vec<_> = ob.trades().iter().map(|t| t.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        let total: Decimal = ob.trades().iter().map(|t| t.size).sum();
        assert_eq!(total, dec!(20));
        assert_consistent(&ob);
    }

    #[test]
    fn serialized_writers_keep_the_book_consistent() {
        let book = shared_book();
        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let book = book.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50u64 {
                    let side = if (worker + i) % 2 == 0 { Side::Bid } else { Side::Ask };
                    let price = Decimal::from(100 + (i % 7));
                    let order = Order::new(side, Decimal::ONE, worker);
                    let id = order.id;
                    book.write().unwrap().place_limit(price, order).unwrap();
                    if i % 3 == 0 {
                        book.write().unwrap().cancel(id).unwrap();
                    }
                    let _ = book.read().unwrap().best_bid();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let guard = book.read().unwrap();
        assert_consistent(&guard);
        // 4 workers x 50 orders, every third cancelled
        assert_eq!(guard.index.len(), 4 * (50 - 17));
    }

    #[test]
    fn snapshot_lists_levels_in_priority_order() {
        let mut ob = OrderBook::new();
        place(&mut ob, Side::Bid, dec!(98), dec!(1));
        place(&mut ob, Side::Bid, dec!(99), dec!(2));
        place(&mut ob, Side::Ask, dec!(101), dec!(3));
        place(&mut ob, Side::Ask, dec!(102), dec!(4));

        let snap = ob.snapshot();
        assert_eq!(snap.bids, vec![(dec!(99), dec!(2)), (dec!(98), dec!(1))]);
        assert_eq!(snap.asks, vec![(dec!(101), dec!(3)), (dec!(102), dec!(4))]);
    }
}
