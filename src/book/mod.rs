//! Order book construction and reconciliation.
//!
//! Layered bottom-up: [`PriceLevel`] holds one price's FIFO queue and cached
//! aggregate, [`BookCore`] owns the sorted sides plus the order arena, and
//! [`SmartBook`] wraps the core with the three-feed reconciliation logic.

pub mod base;
pub mod price_level;
pub mod smart;
pub mod smart_level;

pub use base::{BookCore, L3Book};
pub use price_level::{BookLevel, PriceLevel};
pub use smart::{BookState, BookStats, SmartBook, SmartBookConfig};
pub use smart_level::{PendingTrade, SmartLevel};
