//! Base L3 book: sorted price levels plus the order arena.
//!
//! High-performance representation following the usual shape:
//! - `BTreeMap` keyed by fixed-point price for sorted levels; bids are read
//!   in reverse (best = highest), asks forward (best = lowest)
//! - ahash `AHashMap` as the order arena, keyed by the order id itself: a
//!   stable integer key that survives any amount of queue churn
//!
//! Levels hold only FIFO queues of ids; the arena is the single source of
//! truth for each order's side, price, and remaining size. Every structural
//! mutation (add, cancel-to-zero, level removal, trim) updates queue,
//! aggregate quantity, and arena in the same call, so no handle can dangle.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::book::price_level::{BookLevel, PriceLevel};
use crate::error::{BookError, Result};
use crate::types::{L3Event, Order, Side};

/// Base L3 book, generic over the stored level type.
///
/// Exposes the add/cancel/execute primitives that mutate state and report
/// the affected level. Unknown-order cancels and executes are recoverable
/// no-ops (`Ok(None)`): an earlier message explaining the removal may have
/// been dropped as stale or never delivered.
#[derive(Debug, Clone)]
pub struct BookCore<L> {
    bids: BTreeMap<i64, L>,
    asks: BTreeMap<i64, L>,
    orders: AHashMap<u64, Order>,
}

/// Base book with plain price levels.
pub type L3Book = BookCore<PriceLevel>;

impl<L: BookLevel> BookCore<L> {
    /// Create an empty book.
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: AHashMap::new(),
        }
    }

    #[inline]
    fn side_map(&self, side: Side) -> &BTreeMap<i64, L> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<i64, L> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// The level at `price`, if present.
    #[inline]
    pub fn level(&self, side: Side, price: i64) -> Option<&L> {
        self.side_map(side).get(&price)
    }

    /// The level at `price`, mutably, if present.
    #[inline]
    pub fn level_mut(&mut self, side: Side, price: i64) -> Option<&mut L> {
        self.side_map_mut(side).get_mut(&price)
    }

    /// Fetch the level at `price`, creating it empty if absent.
    pub fn get_or_add_level(&mut self, side: Side, price: i64) -> &mut L {
        self.side_map_mut(side)
            .entry(price)
            .or_insert_with(|| L::new(side, price))
    }

    /// Remove the level at `price`, erasing its queued orders from the
    /// arena. Removing a non-existent level is a contract violation.
    pub fn remove_level(&mut self, side: Side, price: i64) -> Result<()> {
        let level = self.side_map_mut(side).remove(&price).ok_or_else(|| {
            BookError::inconsistent(format!("no {side:?} level at price {price} to remove"))
        })?;
        for id in level.base().orders() {
            self.orders.remove(&id);
        }
        Ok(())
    }

    /// Add a new order, returning the affected level. An id that is already
    /// live is rejected.
    pub fn add(&mut self, order_id: u64, side: Side, size: u32, price: i64) -> Result<(Side, i64)> {
        if self.orders.contains_key(&order_id) {
            return Err(BookError::InvalidOrderId(order_id));
        }
        self.orders.insert(
            order_id,
            Order {
                id: order_id,
                side,
                size,
                price,
            },
        );
        let level = self.get_or_add_level(side, price);
        level.base_mut().push_order(order_id, size);
        Ok((side, price))
    }

    /// Cancel an order down to `new_size` (0 removes it entirely),
    /// returning the affected level, or `Ok(None)` for an unknown id.
    ///
    /// Errors with [`BookError::SideMismatch`] when `claimed_side` disagrees
    /// with the recorded side; that indicates a corrupted feed, not a
    /// normal race between feeds.
    pub fn cancel(
        &mut self,
        order_id: u64,
        claimed_side: Side,
        new_size: u32,
    ) -> Result<Option<(Side, i64)>> {
        let order = match self.orders.get_mut(&order_id) {
            Some(order) => order,
            None => return Ok(None),
        };
        if order.side != claimed_side {
            return Err(BookError::SideMismatch {
                order_id,
                recorded: order.side,
                claimed: claimed_side,
            });
        }
        let (side, price, old_size) = (order.side, order.price, order.size);
        order.size = new_size;
        if new_size == 0 {
            self.orders.remove(&order_id);
        }

        let level = self.level_mut(side, price).ok_or_else(|| {
            BookError::inconsistent(format!(
                "order {order_id} references missing {side:?} level at price {price}"
            ))
        })?;
        if new_size == 0 {
            if !level.base_mut().remove_order(order_id, old_size) {
                return Err(BookError::inconsistent(format!(
                    "order {order_id} missing from {side:?} level queue at price {price}"
                )));
            }
        } else {
            level.base_mut().resize_order(old_size, new_size);
        }
        Ok(Some((side, price)))
    }

    /// Execute `exec_size` against an order's remaining size, returning the
    /// affected level, or `Ok(None)` for an unknown id.
    pub fn execute(
        &mut self,
        order_id: u64,
        claimed_side: Side,
        exec_size: u32,
    ) -> Result<Option<(Side, i64)>> {
        let remaining = match self.orders.get(&order_id) {
            Some(order) => {
                if order.side != claimed_side {
                    return Err(BookError::SideMismatch {
                        order_id,
                        recorded: order.side,
                        claimed: claimed_side,
                    });
                }
                order.size
            }
            None => return Ok(None),
        };
        if exec_size > remaining {
            return Err(BookError::ExecutionExceedsSize {
                order_id,
                exec_size,
                remaining,
            });
        }
        self.cancel(order_id, claimed_side, remaining - exec_size)
    }

    /// Apply an L3 event, returning the levels it touched (a modify touches
    /// up to two).
    ///
    /// The `Cancel`/`Modify`/`Execute` wire variants carry no side; it is
    /// taken from the recorded order, and an event for an id the book does
    /// not know is a logged no-op.
    pub fn apply_event(&mut self, event: &L3Event) -> Result<Vec<(Side, i64)>> {
        let mut touched = Vec::with_capacity(2);
        match *event {
            L3Event::Add {
                order_id,
                side,
                size,
                price,
            } => {
                touched.push(self.add(order_id, side, size, price)?);
            }
            L3Event::Cancel { order_id } => match self.order(order_id) {
                Some(order) => {
                    if let Some(t) = self.cancel(order_id, order.side, 0)? {
                        touched.push(t);
                    }
                }
                None => log::debug!("cancel for unknown order {order_id}, ignoring"),
            },
            L3Event::Modify {
                order_id,
                new_size,
                new_price,
            } => match self.order(order_id) {
                Some(order) => {
                    let side = order.side;
                    if let Some(t) = self.cancel(order_id, side, 0)? {
                        touched.push(t);
                    }
                    if new_size > 0 {
                        touched.push(self.add(order_id, side, new_size, new_price)?);
                    }
                }
                None => log::debug!("modify for unknown order {order_id}, ignoring"),
            },
            L3Event::Execute { order_id, size } => match self.order(order_id) {
                Some(order) => {
                    if let Some(t) = self.execute(order_id, order.side, size)? {
                        touched.push(t);
                    }
                }
                None => log::debug!("execute for unknown order {order_id}, ignoring"),
            },
        }
        Ok(touched)
    }

    /// Remove every level strictly better than `price` on `side` (bids
    /// above it, asks below it), erasing their orders from the arena.
    /// Returns the number of levels removed.
    pub fn trim_better_than(&mut self, side: Side, price: i64) -> Result<usize> {
        let doomed: Vec<i64> = match side {
            Side::Bid => self.bids.range(price + 1..).map(|(&p, _)| p).collect(),
            Side::Ask => self.asks.range(..price).map(|(&p, _)| p).collect(),
        };
        for &p in &doomed {
            self.remove_level(side, p)?;
        }
        Ok(doomed.len())
    }

    /// Look up an order by id.
    #[inline]
    pub fn order(&self, order_id: u64) -> Option<Order> {
        self.orders.get(&order_id).copied()
    }

    /// Number of live orders.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// The order arena: id to full order record, for every live order.
    #[inline]
    pub fn arena(&self) -> &AHashMap<u64, Order> {
        &self.orders
    }

    /// Best (highest) bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    /// Best (lowest) ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    /// Number of price levels on the bid side.
    #[inline]
    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    /// Number of price levels on the ask side.
    #[inline]
    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    /// Levels on `side`, best-to-worst.
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = &L> + '_> {
        match side {
            Side::Bid => Box::new(self.bids.values().rev()),
            Side::Ask => Box::new(self.asks.values()),
        }
    }
}

impl<L: BookLevel> Default for BookCore<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::price_from_f64;

    fn px(p: f64) -> i64 {
        price_from_f64(p)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_bid(), Some(px(100.0)));
        let level = book.level(Side::Bid, px(100.0)).unwrap();
        assert_eq!(level.qty(), 10);
        assert_eq!(level.order_count(), 1);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        let err = book.add(1001, Side::Bid, 5, px(101.0)).unwrap_err();
        assert!(matches!(err, BookError::InvalidOrderId(1001)));
    }

    #[test]
    fn test_cancel_to_zero_removes_order_and_keeps_level() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        let touched = book.cancel(1001, Side::Bid, 0).unwrap();
        assert_eq!(touched, Some((Side::Bid, px(100.0))));
        assert_eq!(book.order_count(), 0);
        // The base book never prunes levels on its own; reconciliation does.
        let level = book.level(Side::Bid, px(100.0)).unwrap();
        assert_eq!(level.qty(), 0);
        assert!(level.is_empty());
    }

    #[test]
    fn test_partial_cancel_adjusts_aggregate() {
        let mut book = L3Book::new();
        book.add(1001, Side::Ask, 10, px(103.0)).unwrap();
        book.add(1002, Side::Ask, 20, px(103.0)).unwrap();
        book.cancel(1001, Side::Ask, 4).unwrap();
        assert_eq!(book.level(Side::Ask, px(103.0)).unwrap().qty(), 24);
        assert_eq!(book.order(1001).unwrap().size, 4);
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let mut book = L3Book::new();
        assert_eq!(book.cancel(999, Side::Bid, 0).unwrap(), None);
    }

    #[test]
    fn test_cancel_side_mismatch() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        let err = book.cancel(1001, Side::Ask, 0).unwrap_err();
        assert!(matches!(
            err,
            BookError::SideMismatch {
                order_id: 1001,
                recorded: Side::Bid,
                claimed: Side::Ask,
            }
        ));
    }

    #[test]
    fn test_execute_partial_and_full() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        book.execute(1001, Side::Bid, 3).unwrap();
        assert_eq!(book.order(1001).unwrap().size, 7);
        assert_eq!(book.level(Side::Bid, px(100.0)).unwrap().qty(), 7);

        book.execute(1001, Side::Bid, 7).unwrap();
        assert_eq!(book.order(1001), None);
        assert_eq!(book.level(Side::Bid, px(100.0)).unwrap().qty(), 0);
    }

    #[test]
    fn test_execute_oversize_errors() {
        let mut book = L3Book::new();
        book.add(1001, Side::Bid, 10, px(100.0)).unwrap();
        let err = book.execute(1001, Side::Bid, 11).unwrap_err();
        assert!(matches!(
            err,
            BookError::ExecutionExceedsSize {
                order_id: 1001,
                exec_size: 11,
                remaining: 10,
            }
        ));
        // Book is unchanged after the rejected execution.
        assert_eq!(book.order(1001).unwrap().size, 10);
    }

    #[test]
    fn test_apply_modify_moves_order() {
        let mut book = L3Book::new();
        book.add(1003, Side::Bid, 10, px(99.0)).unwrap();
        let touched = book
            .apply_event(&L3Event::Modify {
                order_id: 1003,
                new_size: 5,
                new_price: px(99.1),
            })
            .unwrap();
        assert_eq!(touched, vec![(Side::Bid, px(99.0)), (Side::Bid, px(99.1))]);
        assert_eq!(book.level(Side::Bid, px(99.0)).unwrap().qty(), 0);
        assert_eq!(book.level(Side::Bid, px(99.1)).unwrap().qty(), 5);
        assert_eq!(book.order(1003).unwrap().price, px(99.1));
    }

    #[test]
    fn test_apply_modify_to_zero_cancels() {
        let mut book = L3Book::new();
        book.add(1003, Side::Bid, 10, px(99.0)).unwrap();
        let touched = book
            .apply_event(&L3Event::Modify {
                order_id: 1003,
                new_size: 0,
                new_price: px(99.1),
            })
            .unwrap();
        assert_eq!(touched, vec![(Side::Bid, px(99.0))]);
        assert_eq!(book.order(1003), None);
        assert!(book.level(Side::Bid, px(99.1)).is_none());
    }

    #[test]
    fn test_apply_event_unknown_orders_are_noops() {
        let mut book = L3Book::new();
        assert!(book
            .apply_event(&L3Event::Cancel { order_id: 5 })
            .unwrap()
            .is_empty());
        assert!(book
            .apply_event(&L3Event::Execute {
                order_id: 5,
                size: 1
            })
            .unwrap()
            .is_empty());
        assert!(book
            .apply_event(&L3Event::Modify {
                order_id: 5,
                new_size: 1,
                new_price: px(1.0)
            })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_remove_level_erases_arena_entries() {
        let mut book = L3Book::new();
        book.add(1, Side::Bid, 10, px(100.0)).unwrap();
        book.add(2, Side::Bid, 20, px(100.0)).unwrap();
        book.add(3, Side::Bid, 5, px(99.0)).unwrap();
        book.remove_level(Side::Bid, px(100.0)).unwrap();
        assert_eq!(book.order(1), None);
        assert_eq!(book.order(2), None);
        assert_eq!(book.order(3).unwrap().size, 5);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_remove_missing_level_errors() {
        let mut book = L3Book::new();
        assert!(book.remove_level(Side::Bid, px(100.0)).is_err());
    }

    #[test]
    fn test_trim_better_than() {
        let mut book = L3Book::new();
        book.add(1, Side::Bid, 10, px(100.0)).unwrap();
        book.add(2, Side::Bid, 10, px(101.0)).unwrap();
        book.add(3, Side::Bid, 10, px(102.0)).unwrap();
        book.add(4, Side::Ask, 10, px(103.0)).unwrap();
        book.add(5, Side::Ask, 10, px(104.0)).unwrap();

        assert_eq!(book.trim_better_than(Side::Bid, px(100.0)).unwrap(), 2);
        assert_eq!(book.best_bid(), Some(px(100.0)));
        assert_eq!(book.order(2), None);
        assert_eq!(book.order(3), None);

        assert_eq!(book.trim_better_than(Side::Ask, px(104.0)).unwrap(), 1);
        assert_eq!(book.best_ask(), Some(px(104.0)));
        assert_eq!(book.order(4), None);
    }

    #[test]
    fn test_levels_iteration_best_first() {
        let mut book = L3Book::new();
        book.add(1, Side::Bid, 10, px(100.0)).unwrap();
        book.add(2, Side::Bid, 10, px(102.0)).unwrap();
        book.add(3, Side::Ask, 10, px(105.0)).unwrap();
        book.add(4, Side::Ask, 10, px(103.0)).unwrap();

        let bid_prices: Vec<i64> = book.levels(Side::Bid).map(|l| l.price()).collect();
        assert_eq!(bid_prices, vec![px(102.0), px(100.0)]);
        let ask_prices: Vec<i64> = book.levels(Side::Ask).map(|l| l.price()).collect();
        assert_eq!(ask_prices, vec![px(103.0), px(105.0)]);
    }
}
