//! Price level enriched with feed-reconciliation state.
//!
//! On top of the confirmed FIFO queue, a smart level tracks the quantity
//! the L2 feed last reported at this price (`l2_qty`) and a ledger of trade
//! prints not yet explained by a later L3 or L2 update. The estimated order
//! view is derived from these three quantities and is diagnostic, not
//! authoritative.
//!
//! # Invariants
//!
//! - `pending_qty` equals the sum of the ledger entries' sizes.
//! - Ledger entries are evicted (and `pending_qty` reduced) once a
//!   reconciliation event with sequence >= the entry's sequence is
//!   processed.

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::book::price_level::{BookLevel, PriceLevel};
use crate::error::{BookError, Result};
use crate::types::{Order, OrderInfo, Side};

/// A trade print awaiting confirmation from a later L2/L3 update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTrade {
    pub seq: u64,
    pub size: u32,
}

/// Price level plus per-feed reconciliation state.
#[derive(Debug, Clone)]
pub struct SmartLevel {
    base: PriceLevel,
    /// Quantity last reported at this price by an L2 snapshot (0 if never
    /// reported, or last reported absent).
    l2_qty: u32,
    pending: VecDeque<PendingTrade>,
    pending_qty: u32,
}

impl BookLevel for SmartLevel {
    fn new(side: Side, price: i64) -> Self {
        Self {
            base: PriceLevel::new(side, price),
            l2_qty: 0,
            pending: VecDeque::new(),
            pending_qty: 0,
        }
    }

    #[inline]
    fn base(&self) -> &PriceLevel {
        &self.base
    }

    #[inline]
    fn base_mut(&mut self) -> &mut PriceLevel {
        &mut self.base
    }
}

impl SmartLevel {
    #[inline]
    pub fn side(&self) -> Side {
        self.base.side()
    }

    #[inline]
    pub fn price(&self) -> i64 {
        self.base.price()
    }

    /// Aggregate quantity confirmed through L3 order flow.
    #[inline]
    pub fn qty(&self) -> u32 {
        self.base.qty()
    }

    /// Number of confirmed orders resting at this price.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.base.order_count()
    }

    /// Quantity last reported at this price by the L2 feed.
    #[inline]
    pub fn l2_qty(&self) -> u32 {
        self.l2_qty
    }

    /// Total size of trade prints not yet explained by L2/L3.
    #[inline]
    pub fn pending_qty(&self) -> u32 {
        self.pending_qty
    }

    /// The unexplained trade prints, oldest first.
    #[inline]
    pub fn pending_trades(&self) -> impl Iterator<Item = PendingTrade> + '_ {
        self.pending.iter().copied()
    }

    pub(crate) fn set_l2_qty(&mut self, qty: u32) {
        self.l2_qty = qty;
    }

    /// Record a trade print not yet explained by the other feeds.
    pub(crate) fn push_pending(&mut self, seq: u64, size: u32) {
        self.pending.push_back(PendingTrade { seq, size });
        self.pending_qty = self.pending_qty.saturating_add(size);
    }

    /// Evict ledger entries explained by a reconciliation event at `seq`.
    pub(crate) fn evict_pending_through(&mut self, seq: u64) {
        while let Some(front) = self.pending.front() {
            if front.seq > seq {
                break;
            }
            self.pending_qty = self.pending_qty.saturating_sub(front.size);
            self.pending.pop_front();
        }
    }

    /// True once nothing at this price needs anchoring: no confirmed
    /// orders, no L2-reported quantity, no pending trades. An exhausted
    /// level is eligible for removal.
    #[inline]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.base.qty() == 0 && self.l2_qty == 0 && self.pending.is_empty()
    }

    /// Best-guess live orders at this level, for display and verification.
    ///
    /// Derivation: quantity the L2 feed no longer confirms is trimmed off
    /// the front (oldest orders are assumed cancelled first); if the L2
    /// feed reports more than the confirmed orders explain, one synthetic
    /// order (id 0) covers the gap at the tail; pending trade quantity is
    /// then consumed from the back, since trades are assumed to eat the
    /// newest resting interest first.
    pub fn estimated_orders(&self, arena: &AHashMap<u64, Order>) -> Vec<OrderInfo> {
        let mut out: Vec<OrderInfo> = Vec::with_capacity(self.base.order_count() + 1);

        let mut cancel_qty = self.base.qty().saturating_sub(self.l2_qty);
        for id in self.base.orders() {
            let Some(order) = arena.get(&id) else {
                continue;
            };
            if order.size > cancel_qty {
                out.push(OrderInfo {
                    order_id: id,
                    side: self.side(),
                    size: order.size - cancel_qty,
                    price: self.price(),
                });
                cancel_qty = 0;
            } else {
                cancel_qty -= order.size;
            }
        }

        if self.l2_qty > self.base.qty() {
            out.push(OrderInfo {
                order_id: 0,
                side: self.side(),
                size: self.l2_qty - self.base.qty(),
                price: self.price(),
            });
        }

        let mut trade_qty = self.pending_qty;
        while trade_qty > 0 {
            let Some(last) = out.last_mut() else {
                break;
            };
            if last.size <= trade_qty {
                trade_qty -= last.size;
                out.pop();
            } else {
                last.size -= trade_qty;
                break;
            }
        }

        out
    }

    /// Check this level's invariants against the order arena.
    pub(crate) fn verify(&self, arena: &AHashMap<u64, Order>) -> Result<()> {
        let side = self.side();
        let price = self.price();

        let mut confirmed: u32 = 0;
        for id in self.base.orders() {
            let order = arena.get(&id).ok_or_else(|| {
                BookError::inconsistent(format!(
                    "order {id} queued at {side:?} level {price} missing from arena"
                ))
            })?;
            if order.side != side || order.price != price {
                return Err(BookError::inconsistent(format!(
                    "order {id} recorded at {:?}/{} but queued at {side:?}/{price}",
                    order.side, order.price
                )));
            }
            confirmed = confirmed.saturating_add(order.size);
        }
        if confirmed != self.base.qty() {
            return Err(BookError::inconsistent(format!(
                "{side:?} level {price}: aggregate {} != confirmed order sum {confirmed}",
                self.base.qty()
            )));
        }

        let estimated: u32 = self
            .estimated_orders(arena)
            .iter()
            .map(|o| o.size)
            .fold(0, u32::saturating_add);
        let expected = self.l2_qty as i64 - self.pending_qty as i64;
        if expected >= 0 && estimated as i64 != expected {
            return Err(BookError::inconsistent(format!(
                "{side:?} level {price}: estimated view total {estimated} != l2 {} - pending {}",
                self.l2_qty, self.pending_qty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_of(orders: &[(u64, u32)], side: Side, price: i64) -> AHashMap<u64, Order> {
        orders
            .iter()
            .map(|&(id, size)| {
                (
                    id,
                    Order {
                        id,
                        side,
                        size,
                        price,
                    },
                )
            })
            .collect()
    }

    fn level_with(orders: &[(u64, u32)], side: Side, price: i64) -> (SmartLevel, AHashMap<u64, Order>) {
        let mut level = <SmartLevel as BookLevel>::new(side, price);
        for &(id, size) in orders {
            level.base_mut().push_order(id, size);
        }
        (level, arena_of(orders, side, price))
    }

    const PX: i64 = 100_000_000_000;

    #[test]
    fn test_estimated_matches_confirmed_when_l2_agrees() {
        let (mut level, arena) = level_with(&[(1, 10), (2, 5)], Side::Bid, PX);
        level.set_l2_qty(15);
        let est = level.estimated_orders(&arena);
        assert_eq!(est.len(), 2);
        assert_eq!((est[0].order_id, est[0].size), (1, 10));
        assert_eq!((est[1].order_id, est[1].size), (2, 5));
    }

    #[test]
    fn test_estimated_trims_assumed_cancels_from_front() {
        // L2 says only 8 remain of the 15 we know; the oldest interest is
        // assumed cancelled first.
        let (mut level, arena) = level_with(&[(1, 10), (2, 5)], Side::Bid, PX);
        level.set_l2_qty(8);
        let est = level.estimated_orders(&arena);
        assert_eq!(est.len(), 2);
        assert_eq!((est[0].order_id, est[0].size), (1, 3));
        assert_eq!((est[1].order_id, est[1].size), (2, 5));
    }

    #[test]
    fn test_estimated_skips_fully_cancelled_front_orders() {
        let (mut level, arena) = level_with(&[(1, 10), (2, 5)], Side::Bid, PX);
        level.set_l2_qty(4);
        let est = level.estimated_orders(&arena);
        assert_eq!(est.len(), 1);
        assert_eq!((est[0].order_id, est[0].size), (2, 4));
    }

    #[test]
    fn test_estimated_synthesizes_phantom_for_l2_surplus() {
        // L2 reports more resting quantity than confirmed orders explain:
        // one guessed order (id 0) covers the gap.
        let (mut level, arena) = level_with(&[(1, 10)], Side::Ask, PX);
        level.set_l2_qty(14);
        let est = level.estimated_orders(&arena);
        assert_eq!(est.len(), 2);
        assert_eq!((est[0].order_id, est[0].size), (1, 10));
        assert_eq!((est[1].order_id, est[1].size), (0, 4));
    }

    #[test]
    fn test_estimated_consumes_pending_trades_from_back() {
        let (mut level, arena) = level_with(&[(1, 10), (2, 5)], Side::Bid, PX);
        level.set_l2_qty(15);
        level.push_pending(7, 6);
        let est = level.estimated_orders(&arena);
        // 6 eaten from the back: order 2 gone, order 1 reduced to 9.
        assert_eq!(est.len(), 1);
        assert_eq!((est[0].order_id, est[0].size), (1, 9));
    }

    #[test]
    fn test_estimated_empty_when_pending_covers_level() {
        let (mut level, arena) = level_with(&[(1, 10)], Side::Bid, PX);
        level.set_l2_qty(10);
        level.push_pending(7, 10);
        assert!(level.estimated_orders(&arena).is_empty());
    }

    #[test]
    fn test_pending_eviction_by_sequence() {
        let (mut level, _arena) = level_with(&[], Side::Bid, PX);
        level.push_pending(5, 3);
        level.push_pending(8, 4);
        assert_eq!(level.pending_qty(), 7);

        level.evict_pending_through(5);
        assert_eq!(level.pending_qty(), 4);

        level.evict_pending_through(4);
        assert_eq!(level.pending_qty(), 4);

        level.evict_pending_through(8);
        assert_eq!(level.pending_qty(), 0);
        assert_eq!(level.pending_trades().count(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let (mut level, _arena) = level_with(&[], Side::Bid, PX);
        assert!(level.is_exhausted());
        level.push_pending(5, 3);
        assert!(!level.is_exhausted());
        level.evict_pending_through(5);
        assert!(level.is_exhausted());
        level.set_l2_qty(2);
        assert!(!level.is_exhausted());
    }

    #[test]
    fn test_verify_accepts_consistent_level() {
        let (mut level, arena) = level_with(&[(1, 10), (2, 5)], Side::Bid, PX);
        level.set_l2_qty(15);
        assert!(level.verify(&arena).is_ok());
    }

    #[test]
    fn test_verify_rejects_aggregate_drift() {
        let (mut level, mut arena) = level_with(&[(1, 10)], Side::Bid, PX);
        level.set_l2_qty(10);
        // Corrupt the arena so the cached aggregate no longer matches.
        arena.get_mut(&1).unwrap().size = 9;
        assert!(level.verify(&arena).is_err());
    }
}
