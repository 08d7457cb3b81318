use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::orders::{Order, OrderId, Side};
use crate::trade::Match;

/// All resting orders at one price on one side of the book.
///
/// Orders queue in FIFO arrival order: new orders append at the tail,
/// matching consumes from the head, and removal by id keeps the relative
/// order of the remainder intact. `total_volume` always equals the sum of
/// the queued sizes.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Decimal,
    orders: VecDeque<Order>,
    total_volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_volume: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn total_volume(&self) -> Decimal {
        self.total_volume
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Append `order` at the tail of the queue. The caller has already
    /// validated that the size is positive.
    pub fn add(&mut self, order: Order) {
        debug_assert!(order.size > Decimal::ZERO);
        self.total_volume += order.size;
        self.orders.push_back(order);
    }

    /// Remove the order with `id`, preserving the queue order of the rest.
    pub fn remove(&mut self, id: OrderId) -> Option<Order> {
        let position = self.orders.iter().position(|o| o.id == id)?;
        let order = self.orders.remove(position)?;
        self.total_volume -= order.size;
        Some(order)
    }

    /// Consume queued orders head-first to satisfy `incoming`, emitting one
    /// [`Match`] per counterparty at this level's price. Fully consumed
    /// resting orders are popped; a partial fill leaves the remainder at the
    /// head with its original timestamp.
    pub fn fill(&mut self, incoming: &mut Order) -> Vec<Match> {
        let mut matches = Vec::new();

        while incoming.size > Decimal::ZERO {
            let Some(resting) = self.orders.front_mut() else {
                break;
            };
            let quantity = incoming.size.min(resting.size);
            resting.size -= quantity;
            incoming.size -= quantity;
            self.total_volume -= quantity;

            let (bid, ask) = match incoming.side {
                Side::Bid => (incoming.clone(), resting.clone()),
                Side::Ask => (resting.clone(), incoming.clone()),
            };
            matches.push(Match {
                bid,
                ask,
                size_filled: quantity,
                price: self.price,
            });

            if self.orders.front().is_some_and(Order::is_filled) {
                self.orders.pop_front();
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: Side, size: Decimal) -> Order {
        Order::new(side, size, 1)
    }

    #[test]
    fn add_accumulates_volume_in_arrival_order() {
        let mut level = PriceLevel::new(dec!(10_000));
        let a = order(Side::Bid, dec!(5));
        let b = order(Side::Bid, dec!(8));
        let a_id = a.id;

        level.add(a);
        level.add(b);

        assert_eq!(level.order_count(), 2);
        assert_eq!(level.total_volume(), dec!(13));
        assert_eq!(level.iter().next().unwrap().id, a_id);
    }

    #[test]
    fn remove_keeps_queue_order() {
        let mut level = PriceLevel::new(dec!(10_000));
        let a = order(Side::Bid, dec!(5));
        let b = order(Side::Bid, dec!(8));
        let c = order(Side::Bid, dec!(10));
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        level.add(a);
        level.add(b);
        level.add(c);
        let removed = level.remove(b_id).unwrap();

        assert_eq!(removed.size, dec!(8));
        assert_eq!(level.total_volume(), dec!(15));
        let ids: Vec<_> = level.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![a_id, c_id]);
    }

    #[test]
    fn remove_of_absent_order_is_none() {
        let mut level = PriceLevel::new(dec!(10_000));
        level.add(order(Side::Ask, dec!(4)));

        assert!(level.remove(OrderId::new()).is_none());
        assert_eq!(level.total_volume(), dec!(4));
    }

    #[test]
    fn fill_consumes_head_first_and_pops_filled_orders() {
        let mut level = PriceLevel::new(dec!(100));
        let first = order(Side::Ask, dec!(4));
        let second = order(Side::Ask, dec!(6));
        let (first_id, second_id) = (first.id, second.id);
        level.add(first);
        level.add(second);

        let mut incoming = order(Side::Bid, dec!(9));
        let matches = level.fill(&mut incoming);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].ask.id, first_id);
        assert_eq!(matches[0].size_filled, dec!(4));
        assert_eq!(matches[1].ask.id, second_id);
        assert_eq!(matches[1].size_filled, dec!(5));
        assert!(incoming.is_filled());

        // the partially filled second order stays at the head
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.iter().next().unwrap().id, second_id);
        assert_eq!(level.total_volume(), dec!(1));
    }

    #[test]
    fn fill_stops_once_incoming_is_satisfied() {
        let mut level = PriceLevel::new(dec!(100));
        level.add(order(Side::Bid, dec!(3)));
        level.add(order(Side::Bid, dec!(3)));

        let mut incoming = order(Side::Ask, dec!(2));
        let matches = level.fill(&mut incoming);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].price, dec!(100));
        assert_eq!(level.order_count(), 2);
        assert_eq!(level.total_volume(), dec!(4));
    }
}
