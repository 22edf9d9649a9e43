//! The reconciliation layer: merging L2 snapshots, L3 events, and trade
//! prints into one consistent order-level book.
//!
//! The three feeds are unsynchronized: any one may lead or lag the others,
//! and each carries its own monotonic sequence space. The book keeps one
//! watermark per feed (trades per side) and decides per message which feed
//! is authoritative at that instant:
//!
//! - L3 is ground truth where it is fresh: events apply to the base book
//!   and pass through to the observer verbatim when they are the newest
//!   information seen.
//! - L2 only reports per-price totals, so an unattributed quantity change
//!   becomes a synthetic event: an increase is a guessed add, a decrease
//!   newer than all trade activity is split into an execution and a cancel
//!   portion by a tunable prior (`exec_ratio`), less whatever the pending
//!   trade ledger already explains.
//! - A trade print ahead of both other feeds is recorded in the traded
//!   level's pending ledger and reported as a synthetic execution at once;
//!   later L2/L3 updates at or past its sequence evict it.
//!
//! Stale messages and events for unknown orders are expected steady-state
//! conditions of a multi-feed merge; they are dropped, counted, and logged
//! at `debug`, never surfaced as errors.

use serde::{Deserialize, Serialize};

use crate::book::base::BookCore;
use crate::book::smart_level::SmartLevel;
use crate::callback::{BookObserver, EventKind};
use crate::error::{BookError, Result};
use crate::types::{price_to_f64, L3Event, Level3, Order, OrderInfo, Side, Snapshot, Trade};

/// Configuration for the reconciliation layer.
#[derive(Debug, Clone)]
pub struct SmartBookConfig {
    /// Prior for the fraction of an unattributed L2 depletion that is due
    /// to fills rather than cancels.
    pub exec_ratio: f64,

    /// Whether to validate messages before processing.
    pub validate_messages: bool,
}

impl Default for SmartBookConfig {
    fn default() -> Self {
        Self {
            exec_ratio: 0.3,
            validate_messages: true,
        }
    }
}

impl SmartBookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution-fraction prior for unattributed L2 depletions.
    pub fn with_exec_ratio(mut self, ratio: f64) -> Self {
        self.exec_ratio = ratio;
        self
    }

    /// Enable/disable message validation.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_messages = validate;
        self
    }
}

/// Counters for monitoring the merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStats {
    /// L2 snapshots applied (stale ones excluded)
    pub l2_snapshots: u64,
    /// L3 messages applied (stale ones excluded)
    pub l3_messages: u64,
    /// Trade prints applied (stale ones excluded)
    pub trades: u64,
    /// Messages dropped by the watermark checks
    pub stale_dropped: u64,
    /// L3 lifecycle events referencing an order the book never saw
    pub unknown_orders: u64,
    /// Callback invocations delivered to the observer
    pub events_emitted: u64,
    /// Events emitted without a real order id behind them
    pub synthetic_events: u64,
    /// Updates that left the book crossed (bad feed data)
    pub crossed_books: u64,
}

#[derive(Debug, Clone, Copy)]
struct QueuedEvent {
    kind: EventKind,
    info: OrderInfo,
}

/// Read-only view of the reconciled book.
///
/// This is what observer callbacks receive: every accessor is `&self`, so a
/// callback cannot re-enter with mutating calls. Mutation is only reachable
/// through [`SmartBook`].
#[derive(Debug)]
pub struct BookState {
    core: BookCore<SmartLevel>,
    config: SmartBookConfig,
    last_l3_seq: u64,
    last_l2_seq: u64,
    last_trade_bid_seq: u64,
    last_trade_ask_seq: u64,
    last_l2_best_bid: Option<i64>,
    last_l2_best_ask: Option<i64>,
    stats: BookStats,
    queued: Vec<QueuedEvent>,
}

impl BookState {
    fn new(config: SmartBookConfig) -> Self {
        Self {
            core: BookCore::new(),
            config,
            last_l3_seq: 0,
            last_l2_seq: 0,
            last_trade_bid_seq: 0,
            last_trade_ask_seq: 0,
            last_l2_best_bid: None,
            last_l2_best_ask: None,
            stats: BookStats::default(),
            queued: Vec::new(),
        }
    }

    // =========================================================================
    // Read-only surface
    // =========================================================================

    /// Best (highest) bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.core.best_bid()
    }

    /// Best (lowest) ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.core.best_ask()
    }

    /// Bid/ask spread in dollars, when both sides are present.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(price_to_f64(ask - bid)),
            _ => None,
        }
    }

    /// Mid price in dollars, when both sides are present.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(price_to_f64(bid + ask) / 2.0),
            _ => None,
        }
    }

    /// True when the best bid is at or through the best ask.
    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.best_bid(), self.best_ask()),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    /// Number of live confirmed orders.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.core.order_count()
    }

    /// Look up a confirmed order by id.
    #[inline]
    pub fn order(&self, order_id: u64) -> Option<Order> {
        self.core.order(order_id)
    }

    /// Number of price levels on the bid side.
    #[inline]
    pub fn bid_level_count(&self) -> usize {
        self.core.bid_level_count()
    }

    /// Number of price levels on the ask side.
    #[inline]
    pub fn ask_level_count(&self) -> usize {
        self.core.ask_level_count()
    }

    /// The level at `price`, if present.
    #[inline]
    pub fn level(&self, side: Side, price: i64) -> Option<&SmartLevel> {
        self.core.level(side, price)
    }

    /// Levels on `side`, best-to-worst.
    pub fn levels(&self, side: Side) -> impl Iterator<Item = &SmartLevel> + '_ {
        self.core.levels(side)
    }

    /// Best-guess orders at `price`, oldest first (diagnostic view).
    pub fn estimated_orders(&self, side: Side, price: i64) -> Option<Vec<OrderInfo>> {
        self.core
            .level(side, price)
            .map(|level| level.estimated_orders(self.core.arena()))
    }

    /// Highest L3 sequence processed.
    #[inline]
    pub fn last_l3_seq(&self) -> u64 {
        self.last_l3_seq
    }

    /// Highest L2 sequence the book state is known to cover.
    #[inline]
    pub fn last_l2_seq(&self) -> u64 {
        self.last_l2_seq
    }

    /// Highest trade sequence processed on `side`.
    #[inline]
    pub fn last_trade_seq(&self, side: Side) -> u64 {
        match side {
            Side::Bid => self.last_trade_bid_seq,
            Side::Ask => self.last_trade_ask_seq,
        }
    }

    /// The best price last reported by the L2 feed on `side`.
    #[inline]
    pub fn last_l2_best(&self, side: Side) -> Option<i64> {
        match side {
            Side::Bid => self.last_l2_best_bid,
            Side::Ask => self.last_l2_best_ask,
        }
    }

    /// Processing counters.
    #[inline]
    pub fn stats(&self) -> &BookStats {
        &self.stats
    }

    /// Human-readable rendering of the book from the estimated order view.
    ///
    /// Two sections, BID then ASK, levels best-to-worst, each as
    /// `price:[size@order_id, ...]`. Levels whose estimated view is empty
    /// are omitted.
    pub fn render(&self) -> String {
        let mut out = String::from("BID:\n");
        self.render_side(Side::Bid, &mut out);
        out.push_str("ASK:\n");
        self.render_side(Side::Ask, &mut out);
        out
    }

    fn render_side(&self, side: Side, out: &mut String) {
        for level in self.core.levels(side) {
            let orders = level.estimated_orders(self.core.arena());
            if orders.is_empty() {
                continue;
            }
            let entries: Vec<String> = orders
                .iter()
                .map(|o| format!("{}@{}", o.size, o.order_id))
                .collect();
            out.push_str(&format!(
                "{}:[{}]\n",
                price_to_f64(level.price()),
                entries.join(", ")
            ));
        }
    }

    /// Check every book invariant.
    ///
    /// Per level: queue/arena agreement and aggregate-quantity equality,
    /// and the estimated view totalling `l2_qty - pending_qty` when that is
    /// non-negative. Globally: the book must not be crossed whenever both
    /// sides are non-empty. Intended for tests and diagnostics.
    pub fn verify_integrity(&self) -> Result<()> {
        for side in [Side::Bid, Side::Ask] {
            for level in self.core.levels(side) {
                level.verify(self.core.arena())?;
            }
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                return Err(BookError::CrossedBook(bid, ask));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Mutation helpers (reachable only through SmartBook)
    // =========================================================================

    fn push_event(&mut self, kind: EventKind, info: OrderInfo) {
        self.stats.events_emitted += 1;
        if info.is_synthetic() {
            self.stats.synthetic_events += 1;
        }
        self.queued.push(QueuedEvent { kind, info });
    }

    fn set_trade_seq(&mut self, side: Side, seq: u64) {
        match side {
            Side::Bid => self.last_trade_bid_seq = seq,
            Side::Ask => self.last_trade_ask_seq = seq,
        }
    }

    fn max_trade_seq(&self) -> u64 {
        self.last_trade_bid_seq.max(self.last_trade_ask_seq)
    }

    /// Anchor a side to a fresh L2 snapshot: once the snapshot is newer
    /// than the side's trade activity, nothing better than its reported
    /// best can still be resting, so stale phantom levels above it are
    /// discarded and the reported best becomes the side's L2 anchor. An
    /// unreported (empty) side carries no information and changes nothing.
    fn refresh_l2_best(&mut self, side: Side, reported_best: Option<i64>, seq: u64) -> Result<()> {
        if seq <= self.last_trade_seq(side) {
            return Ok(());
        }
        let Some(best) = reported_best else {
            return Ok(());
        };
        self.core.trim_better_than(side, best)?;
        match side {
            Side::Bid => self.last_l2_best_bid = Some(best),
            Side::Ask => self.last_l2_best_ask = Some(best),
        }
        Ok(())
    }

    /// Fold one reported `(price, qty)` into the level, synthesizing events
    /// for the unattributed difference.
    fn update_l2_level(&mut self, seq: u64, reported_qty: u32, side: Side, price: i64) -> Result<()> {
        debug_assert!(
            seq > self.last_l3_seq,
            "L2 level update behind the L3 watermark"
        );
        let exec_ratio = self.config.exec_ratio;
        let max_trade_seq = self.max_trade_seq();

        let level = self.core.get_or_add_level(side, price);
        let delta = reported_qty as i64 - level.l2_qty() as i64;
        let pending_qty = level.pending_qty();
        level.set_l2_qty(reported_qty);
        level.evict_pending_through(seq);
        let exhausted = level.is_exhausted();

        if delta > 0 {
            // Unattributed increase: somebody joined the level unseen.
            self.push_event(
                EventKind::Add,
                OrderInfo {
                    order_id: 0,
                    side,
                    size: delta as u32,
                    price,
                },
            );
        } else if delta < 0 && seq > max_trade_seq {
            // Unattributed decrease newer than all trade activity: split it
            // into an executed and a cancelled portion by the configured
            // prior, minus what the pending ledger already explains.
            let decrease = (-delta) as u32;
            let exec_qty = ((decrease as f64 * exec_ratio) as i64 - pending_qty as i64)
                .max(0)
                .min(decrease as i64) as u32;
            let cancel_qty = decrease - exec_qty;
            if exec_qty > 0 {
                self.push_event(
                    EventKind::Execution,
                    OrderInfo {
                        order_id: 0,
                        side,
                        size: exec_qty,
                        price,
                    },
                );
            }
            if cancel_qty > 0 {
                self.push_event(
                    EventKind::Cancel,
                    OrderInfo {
                        order_id: 0,
                        side,
                        size: cancel_qty,
                        price,
                    },
                );
            }
        }
        // A decrease at or behind a trade watermark was already reported
        // through the trade path; nothing to synthesize.

        if exhausted {
            self.core.remove_level(side, price)?;
        }
        Ok(())
    }

    /// An L3 event at `seq` certifies the touched level's state: when no L2
    /// snapshot is fresher, the confirmed aggregate IS the L2 quantity, and
    /// pending trades up to `seq` are explained.
    fn reconcile_l3(&mut self, seq: u64, side: Side, price: i64) -> Result<()> {
        if self.last_l2_seq > seq {
            return Ok(());
        }
        let Some(level) = self.core.level_mut(side, price) else {
            return Ok(());
        };
        let qty = level.qty();
        level.set_l2_qty(qty);
        level.evict_pending_through(seq);
        if level.is_exhausted() {
            self.core.remove_level(side, price)?;
        }
        Ok(())
    }

    /// Remove levels priced beyond what the L2 feed last reported as the
    /// best on `side`. A side the L2 feed has never reported is left alone.
    fn trim_beyond_l2_best(&mut self, side: Side) -> Result<()> {
        if let Some(best) = self.last_l2_best(side) {
            self.core.trim_better_than(side, best)?;
        }
        Ok(())
    }

    /// Payload for passing a ground-truth L3 event straight to the
    /// observer. Size and price for cancels, modifies, and executions come
    /// from the recorded order; an id the book has never seen yields
    /// nothing to report (the wire variants carry no side).
    fn passthrough_info(&self, event: &L3Event) -> Option<(EventKind, OrderInfo)> {
        match *event {
            L3Event::Add {
                order_id,
                side,
                size,
                price,
            } => Some((
                EventKind::Add,
                OrderInfo {
                    order_id,
                    side,
                    size,
                    price,
                },
            )),
            L3Event::Cancel { order_id } => self.core.order(order_id).map(|o| {
                (
                    EventKind::Cancel,
                    OrderInfo {
                        order_id,
                        side: o.side,
                        size: o.size,
                        price: o.price,
                    },
                )
            }),
            L3Event::Modify {
                order_id,
                new_size,
                new_price,
            } => self.core.order(order_id).map(|o| {
                (
                    EventKind::Modify,
                    OrderInfo {
                        order_id,
                        side: o.side,
                        size: new_size,
                        price: new_price,
                    },
                )
            }),
            L3Event::Execute { order_id, size } => self.core.order(order_id).map(|o| {
                (
                    EventKind::Execution,
                    OrderInfo {
                        order_id,
                        side: o.side,
                        size,
                        price: o.price,
                    },
                )
            }),
        }
    }

    fn note_consistency(&mut self) {
        if self.is_crossed() {
            self.stats.crossed_books += 1;
            if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
                log::warn!(
                    "book crossed after update: best_bid={:.4} >= best_ask={:.4}",
                    price_to_f64(bid),
                    price_to_f64(ask)
                );
            }
        }
    }
}

impl std::fmt::Display for BookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Order book reconstructed from three unsynchronized feeds.
///
/// Wraps the base book with per-level L2 state and the pending-trade
/// ledger. Each update entry point mutates book state and then delivers the
/// normalized events to the observer, synchronously and in emission order,
/// before returning. Single-threaded by design: the caller serializes feed
/// delivery.
#[derive(Debug)]
pub struct SmartBook<C> {
    state: BookState,
    observer: C,
}

impl<C: BookObserver> SmartBook<C> {
    /// Create a book with default configuration.
    pub fn new(observer: C) -> Self {
        Self::with_config(SmartBookConfig::default(), observer)
    }

    /// Create a book with custom configuration.
    pub fn with_config(config: SmartBookConfig, observer: C) -> Self {
        Self {
            state: BookState::new(config),
            observer,
        }
    }

    /// Read-only view of the current book state.
    #[inline]
    pub fn state(&self) -> &BookState {
        &self.state
    }

    /// Processing counters.
    #[inline]
    pub fn stats(&self) -> &BookStats {
        self.state.stats()
    }

    /// The observer.
    #[inline]
    pub fn observer(&self) -> &C {
        &self.observer
    }

    /// The observer, mutably.
    #[inline]
    pub fn observer_mut(&mut self) -> &mut C {
        &mut self.observer
    }

    /// Consume the book, returning the observer.
    pub fn into_observer(self) -> C {
        self.observer
    }

    /// Apply an L2 depth snapshot.
    ///
    /// Ignored when at or behind the L2 watermark. Otherwise each side is
    /// re-anchored to the snapshot's best price, every reported level is
    /// folded in (synthesizing add/execution/cancel events for quantity the
    /// other feeds cannot explain), and the L2 watermark advances.
    pub fn update_l2(&mut self, snapshot: &Snapshot) -> Result<()> {
        if self.state.config.validate_messages {
            snapshot.validate()?;
        }
        if snapshot.seq <= self.state.last_l2_seq {
            self.state.stats.stale_dropped += 1;
            log::debug!(
                "dropping stale L2 snapshot seq {} (watermark {})",
                snapshot.seq,
                self.state.last_l2_seq
            );
            return Ok(());
        }
        self.state.stats.l2_snapshots += 1;

        let best_bid = snapshot.bids.first().map(|l| l.price);
        let best_ask = snapshot.asks.first().map(|l| l.price);
        self.state.refresh_l2_best(Side::Bid, best_bid, snapshot.seq)?;
        self.state.refresh_l2_best(Side::Ask, best_ask, snapshot.seq)?;

        for entry in &snapshot.bids {
            self.state
                .update_l2_level(snapshot.seq, entry.qty, Side::Bid, entry.price)?;
        }
        for entry in &snapshot.asks {
            self.state
                .update_l2_level(snapshot.seq, entry.qty, Side::Ask, entry.price)?;
        }

        self.state.last_l2_seq = snapshot.seq;
        self.state.note_consistency();
        self.flush_events();
        Ok(())
    }

    /// Apply a per-order L3 event (the ground-truth path).
    ///
    /// Ignored when at or behind the L3 watermark. The event mutates the
    /// base book, the touched levels reconcile against the L2/trade state,
    /// a late event additionally trims levels the other feeds have already
    /// disowned, and an event that is the newest information seen passes
    /// through to the observer with its real order id.
    pub fn update_l3(&mut self, msg: &Level3) -> Result<()> {
        if self.state.config.validate_messages {
            msg.validate()?;
        }
        if msg.seq <= self.state.last_l3_seq {
            self.state.stats.stale_dropped += 1;
            log::debug!(
                "dropping stale L3 message seq {} (watermark {})",
                msg.seq,
                self.state.last_l3_seq
            );
            return Ok(());
        }
        self.state.stats.l3_messages += 1;

        let newest = msg.seq > self.state.last_l2_seq
            && msg.seq > self.state.last_trade_bid_seq
            && msg.seq > self.state.last_trade_ask_seq;
        let passthrough = if newest {
            self.state.passthrough_info(&msg.event)
        } else {
            None
        };

        let touched = self.state.core.apply_event(&msg.event)?;
        if touched.is_empty() && !matches!(msg.event, L3Event::Add { .. }) {
            self.state.stats.unknown_orders += 1;
        }
        for (side, price) in touched {
            self.state.reconcile_l3(msg.seq, side, price)?;
        }

        // A late-arriving L3 message must not resurrect levels the book has
        // already learned (via L2 or trades) no longer exist.
        if msg.seq < self.state.last_l2_seq {
            self.state.trim_beyond_l2_best(Side::Bid)?;
            self.state.trim_beyond_l2_best(Side::Ask)?;
        }
        if msg.seq <= self.state.last_trade_bid_seq {
            self.state.trim_beyond_l2_best(Side::Bid)?;
        }
        if msg.seq <= self.state.last_trade_ask_seq {
            self.state.trim_beyond_l2_best(Side::Ask)?;
        }

        if let Some((kind, info)) = passthrough {
            self.state.push_event(kind, info);
        }

        self.state.last_l3_seq = msg.seq;
        // An applied L3 event also certifies the book is caught up to at
        // least this sequence on the L2 side.
        self.state.last_l2_seq = self.state.last_l2_seq.max(msg.seq);
        self.state.note_consistency();
        self.flush_events();
        Ok(())
    }

    /// Apply a trade print.
    ///
    /// Ignored when already explained by either other feed or by a previous
    /// trade on the same side. Otherwise levels better than the print are
    /// trimmed (a fill at this price implies nothing better remains
    /// unmatched), the print joins the level's pending ledger, and a
    /// synthetic execution is reported immediately.
    pub fn update_trade(&mut self, trade: &Trade) -> Result<()> {
        if self.state.config.validate_messages {
            trade.validate()?;
        }
        if trade.seq <= self.state.last_l3_seq
            || trade.seq <= self.state.last_l2_seq
            || trade.seq <= self.state.last_trade_seq(trade.side)
        {
            self.state.stats.stale_dropped += 1;
            log::debug!("dropping already-explained trade seq {}", trade.seq);
            return Ok(());
        }
        self.state.stats.trades += 1;

        self.state.core.trim_better_than(trade.side, trade.price)?;

        let level = self.state.core.get_or_add_level(trade.side, trade.price);
        level.push_pending(trade.seq, trade.size);
        self.state.set_trade_seq(trade.side, trade.seq);
        self.state.push_event(
            EventKind::Execution,
            OrderInfo {
                order_id: 0,
                side: trade.side,
                size: trade.size,
                price: trade.price,
            },
        );
        self.state.note_consistency();
        self.flush_events();
        Ok(())
    }

    /// Deliver queued events to the observer, in emission order.
    fn flush_events(&mut self) {
        if self.state.queued.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.state.queued);
        for ev in events {
            match ev.kind {
                EventKind::Add => self.observer.on_order_add(&self.state, &ev.info),
                EventKind::Cancel => self.observer.on_order_cancel(&self.state, &ev.info),
                EventKind::Modify => self.observer.on_order_modify(&self.state, &ev.info),
                EventKind::Execution => self.observer.on_order_execution(&self.state, &ev.info),
            }
        }
    }
}
