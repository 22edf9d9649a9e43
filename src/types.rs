//! Core data types for the three market-data feeds and the book.
//!
//! These types are designed to be:
//! - Passive: immutable one-shot messages, `Copy` where possible
//! - Exact: prices are fixed-point `i64` so they are usable as ordered map keys
//! - Self-checking: every inbound message can validate its own fields
//!
//! Each feed carries its own monotonic sequence space; sequence ids are `u64`
//! with 0 reserved as the "nothing processed yet" watermark value.

use serde::{Deserialize, Serialize};

use crate::error::{BookError, Result};

/// Fixed-point price scale: prices are `i64` ticks of 1e-9 dollars.
pub const PRICE_SCALE: i64 = 1_000_000_000;

/// Convert a floating-point dollar price to fixed-point.
#[inline]
pub fn price_from_f64(price: f64) -> i64 {
    (price * PRICE_SCALE as f64).round() as i64
}

/// Convert a fixed-point price to floating-point dollars.
#[inline]
pub fn price_to_f64(price: i64) -> f64 {
    price as f64 / PRICE_SCALE as f64
}

/// Order side (bid or ask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy order (bid)
    Bid = b'B',
    /// Sell order (ask)
    Ask = b'A',
}

impl Side {
    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Check if this is an ask.
    #[inline(always)]
    pub fn is_ask(self) -> bool {
        matches!(self, Side::Ask)
    }

    /// The opposite side.
    #[inline(always)]
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// A live order tracked by the book.
///
/// Identity is `id`; ids are unique while the order is live. Everything but
/// `size` is immutable for the order's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub side: Side,
    pub size: u32,
    pub price: i64,
}

/// Normalized order-level event payload handed to observer callbacks and
/// returned from the estimated order view.
///
/// `order_id == 0` marks a synthetic/estimated order: the originating feed
/// (L2 depth or a bare trade print) lacked order identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: u64,
    pub side: Side,
    pub size: u32,
    pub price: i64,
}

impl OrderInfo {
    /// True for events without a real order id behind them.
    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.order_id == 0
    }

    /// Get price as floating point dollars.
    #[inline]
    pub fn price_as_f64(&self) -> f64 {
        price_to_f64(self.price)
    }
}

/// One price level of an L2 depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Level {
    pub price: i64,
    pub qty: u32,
}

impl L2Level {
    pub fn new(price: i64, qty: u32) -> Self {
        Self { price, qty }
    }
}

/// Periodic aggregated depth snapshot (L2).
///
/// Both sides are reported best-first: bids descending by price, asks
/// ascending. An L2 snapshot never reveals which orders changed, only the
/// total quantity now resting at each reported price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub seq: u64,
    pub bids: Vec<L2Level>,
    pub asks: Vec<L2Level>,
}

impl Snapshot {
    pub fn new(seq: u64, bids: Vec<L2Level>, asks: Vec<L2Level>) -> Self {
        Self { seq, bids, asks }
    }

    /// Validate prices and best-first ordering of both sides.
    pub fn validate(&self) -> Result<()> {
        for level in self.bids.iter().chain(self.asks.iter()) {
            if level.price <= 0 {
                return Err(BookError::InvalidPrice(level.price));
            }
        }
        if !self.bids.windows(2).all(|w| w[0].price > w[1].price) {
            return Err(BookError::inconsistent("snapshot bids not best-first"));
        }
        if !self.asks.windows(2).all(|w| w[0].price < w[1].price) {
            return Err(BookError::inconsistent("snapshot asks not best-first"));
        }
        Ok(())
    }
}

/// Per-order lifecycle event payload (L3), tagged by kind.
///
/// The four kinds are processed completely differently, so this is a sum
/// type with exhaustive matching rather than anything polymorphic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L3Event {
    /// A new order joined the book.
    Add {
        order_id: u64,
        side: Side,
        size: u32,
        price: i64,
    },
    /// An order left the book without trading.
    Cancel { order_id: u64 },
    /// An order was replaced in place; `new_size == 0` cancels it outright.
    Modify {
        order_id: u64,
        new_size: u32,
        new_price: i64,
    },
    /// Part or all of an order's remaining size was filled.
    Execute { order_id: u64, size: u32 },
}

impl L3Event {
    /// The order id this event refers to.
    #[inline]
    pub fn order_id(&self) -> u64 {
        match *self {
            L3Event::Add { order_id, .. }
            | L3Event::Cancel { order_id }
            | L3Event::Modify { order_id, .. }
            | L3Event::Execute { order_id, .. } => order_id,
        }
    }
}

/// An L3 message: a sequence id plus the event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level3 {
    pub seq: u64,
    pub event: L3Event,
}

impl Level3 {
    pub fn new(seq: u64, event: L3Event) -> Self {
        Self { seq, event }
    }

    /// Validate the message fields.
    pub fn validate(&self) -> Result<()> {
        if self.event.order_id() == 0 {
            return Err(BookError::InvalidOrderId(0));
        }
        match self.event {
            L3Event::Add { size, price, .. } => {
                if price <= 0 {
                    return Err(BookError::InvalidPrice(price));
                }
                if size == 0 {
                    return Err(BookError::InvalidSize(0));
                }
            }
            L3Event::Modify { new_price, .. } => {
                if new_price <= 0 {
                    return Err(BookError::InvalidPrice(new_price));
                }
            }
            L3Event::Execute { size, .. } => {
                if size == 0 {
                    return Err(BookError::InvalidSize(0));
                }
            }
            L3Event::Cancel { .. } => {}
        }
        Ok(())
    }
}

/// A trade print: a fill was observed, independently of the L2/L3 feeds.
///
/// `side` denotes the resting (passive) side of the fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub seq: u64,
    pub side: Side,
    pub price: i64,
    pub size: u32,
}

impl Trade {
    pub fn new(seq: u64, side: Side, price: i64, size: u32) -> Self {
        Self {
            seq,
            side,
            price,
            size,
        }
    }

    /// Validate the message fields.
    pub fn validate(&self) -> Result<()> {
        if self.price <= 0 {
            return Err(BookError::InvalidPrice(self.price));
        }
        if self.size == 0 {
            return Err(BookError::InvalidSize(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_conversion_round_trip() {
        assert_eq!(price_from_f64(100.0), 100_000_000_000);
        assert_eq!(price_from_f64(99.1), 99_100_000_000);
        assert_eq!(price_to_f64(99_100_000_000), 99.1);
        assert_eq!(price_to_f64(102_000_000_000), 102.0);
    }

    #[test]
    fn test_side_helpers() {
        assert!(Side::Bid.is_bid());
        assert!(Side::Ask.is_ask());
        assert_eq!(Side::Bid.opposite(), Side::Ask);
    }

    #[test]
    fn test_l3_validate_rejects_zero_order_id() {
        let msg = Level3::new(
            1,
            L3Event::Add {
                order_id: 0,
                side: Side::Bid,
                size: 10,
                price: price_from_f64(100.0),
            },
        );
        assert!(matches!(msg.validate(), Err(BookError::InvalidOrderId(0))));
    }

    #[test]
    fn test_l3_validate_rejects_bad_price_and_size() {
        let bad_price = Level3::new(
            1,
            L3Event::Add {
                order_id: 1,
                side: Side::Bid,
                size: 10,
                price: 0,
            },
        );
        assert!(matches!(
            bad_price.validate(),
            Err(BookError::InvalidPrice(0))
        ));

        let bad_size = Level3::new(
            1,
            L3Event::Execute {
                order_id: 1,
                size: 0,
            },
        );
        assert!(matches!(bad_size.validate(), Err(BookError::InvalidSize(0))));
    }

    #[test]
    fn test_modify_to_zero_size_is_valid() {
        let msg = Level3::new(
            1,
            L3Event::Modify {
                order_id: 1,
                new_size: 0,
                new_price: price_from_f64(100.0),
            },
        );
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_snapshot_validate_ordering() {
        let good = Snapshot::new(
            1,
            vec![
                L2Level::new(price_from_f64(101.0), 5),
                L2Level::new(price_from_f64(100.0), 5),
            ],
            vec![
                L2Level::new(price_from_f64(102.0), 5),
                L2Level::new(price_from_f64(103.0), 5),
            ],
        );
        assert!(good.validate().is_ok());

        let bad = Snapshot::new(
            1,
            vec![
                L2Level::new(price_from_f64(100.0), 5),
                L2Level::new(price_from_f64(101.0), 5),
            ],
            vec![],
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_trade_validate() {
        assert!(Trade::new(1, Side::Bid, price_from_f64(100.0), 5)
            .validate()
            .is_ok());
        assert!(Trade::new(1, Side::Bid, price_from_f64(100.0), 0)
            .validate()
            .is_err());
        assert!(Trade::new(1, Side::Bid, -1, 5).validate().is_err());
    }

    #[test]
    fn test_order_info_synthetic_flag() {
        let synthetic = OrderInfo {
            order_id: 0,
            side: Side::Bid,
            size: 5,
            price: price_from_f64(100.0),
        };
        assert!(synthetic.is_synthetic());
        assert_eq!(synthetic.price_as_f64(), 100.0);
    }
}
