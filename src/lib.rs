//! # lob-reconciler
//!
//! Best-estimate, order-level reconstruction of an exchange's limit order
//! book from three independently-arriving, differently-granular feeds:
//! periodic aggregated depth snapshots (L2), per-order lifecycle events
//! (L3: add/modify/cancel/execute), and trade prints.
//!
//! The feeds are not synchronized: any one may lead or lag the others, and
//! each carries its own monotonic sequence space. L2 in particular never
//! reveals which orders changed, only a per-price total. The engine merges
//! all three into a single consistent book and emits normalized order-level
//! events to a downstream observer even when the originating feed could not
//! itself supply that granularity.
//!
//! ## Features
//!
//! - **Three-feed merge**: sequence watermarks per feed (trades per side)
//!   decide which feed is authoritative at every instant; stale replays are
//!   dropped silently
//! - **Synthetic events**: unattributed L2 quantity changes become guessed
//!   add/execution/cancel events (order id 0), with the execution/cancel
//!   split driven by a tunable prior
//! - **Pending-trade ledger**: trade prints ahead of both other feeds are
//!   held per level until a later L2/L3 update explains them
//! - **Estimated order view**: per level, a best-guess order list derived
//!   from confirmed orders, the last L2 report, and pending trades
//! - **Diagnostics**: human-readable book rendering and a full invariant
//!   check, both callable from inside observer callbacks
//!
//! ## Quick Start
//!
//! ```rust
//! use lob_reconciler::{
//!     price_from_f64, L3Event, Level3, NullObserver, Side, SmartBook,
//! };
//!
//! let mut book = SmartBook::new(NullObserver);
//!
//! // Ground-truth L3 flow
//! book.update_l3(&Level3::new(
//!     1,
//!     L3Event::Add {
//!         order_id: 1001,
//!         side: Side::Bid,
//!         size: 10,
//!         price: price_from_f64(100.0),
//!     },
//! ))
//! .unwrap();
//!
//! assert_eq!(book.state().best_bid(), Some(price_from_f64(100.0)));
//! println!("{}", book.state());
//! ```
//!
//! ### Observing normalized events
//!
//! ```rust
//! use lob_reconciler::{
//!     BookObserver, BookState, L2Level, OrderInfo, SmartBook, Snapshot,
//! };
//!
//! #[derive(Default)]
//! struct Printer;
//!
//! impl BookObserver for Printer {
//!     fn on_order_add(&mut self, book: &BookState, info: &OrderInfo) {
//!         // order_id 0 marks a synthetic order guessed from L2 depth
//!         println!("add {}@{} (id {})", info.size, info.price_as_f64(), info.order_id);
//!         book.verify_integrity().unwrap();
//!     }
//! }
//!
//! let mut book = SmartBook::new(Printer);
//! let snapshot = Snapshot::new(1, vec![L2Level::new(100_000_000_000, 5)], vec![]);
//! book.update_l2(&snapshot).unwrap();
//! assert_eq!(book.stats().synthetic_events, 1);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Feed messages and value types: `Snapshot`, `Level3`, `Trade`, `Order`, `OrderInfo` |
//! | [`book`] | `PriceLevel`, the base `BookCore`, and the reconciling `SmartBook` |
//! | [`callback`] | `BookObserver`: the synchronous event-sink capability |
//! | [`error`] | `BookError` and the crate `Result` alias |
//! | [`tradelog`] | CSV trade-log reader and FIFO realized PnL (feature `tradelog`) |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `tradelog` | yes | CSV trade-log ingestion and PnL utilities |

pub mod book;
pub mod callback;
pub mod error;
pub mod types;

#[cfg(feature = "tradelog")]
pub mod tradelog;

// Re-exports - Core types
pub use error::{BookError, Result};
pub use types::{
    price_from_f64, price_to_f64, L2Level, L3Event, Level3, Order, OrderInfo, Side, Snapshot,
    Trade, PRICE_SCALE,
};

// Re-exports - Book
pub use book::{
    BookCore, BookLevel, BookState, BookStats, L3Book, PendingTrade, PriceLevel, SmartBook,
    SmartBookConfig, SmartLevel,
};

// Re-exports - Observer capability
pub use callback::{BookObserver, EventKind, NullObserver};

// Re-exports - Trade-log utilities (feature-gated)
#[cfg(feature = "tradelog")]
pub use tradelog::{read_trade_log, realized_pnl, PnlRecord, PnlTracker, TradeRecord};
