//! Event sink capability consumed by an external observer.
//!
//! The reconciliation layer calls into this interface; it never implements
//! it. Callbacks run synchronously on the caller's thread, in emission
//! order, before the triggering update returns. Every method defaults to a
//! no-op so observers implement only the events they care about.

use crate::book::BookState;
use crate::types::OrderInfo;

/// Discriminant for the four normalized event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Cancel,
    Modify,
    Execution,
}

/// Synchronous observer for normalized order-level events.
///
/// Each callback receives a read-only view of the book as of that event and
/// the normalized [`OrderInfo`] (order id 0 = synthetic: the originating
/// feed could not supply order identity). The view supports diagnostic
/// reads (rendering, invariant checks, level queries); mutation from inside
/// a callback is impossible by construction.
pub trait BookObserver {
    /// A new order (real or guessed) appeared on the book.
    fn on_order_add(&mut self, _book: &BookState, _info: &OrderInfo) {}

    /// An order (real or guessed) left the book without trading.
    fn on_order_cancel(&mut self, _book: &BookState, _info: &OrderInfo) {}

    /// An order was replaced with a new size and/or price.
    fn on_order_modify(&mut self, _book: &BookState, _info: &OrderInfo) {}

    /// Resting quantity was filled, confirmed or inferred.
    fn on_order_execution(&mut self, _book: &BookState, _info: &OrderInfo) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl BookObserver for NullObserver {}
