//! Error types for the reconciliation engine.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//!
//! Expected steady-state conditions of a multi-feed merge are deliberately
//! NOT errors: stale replays and lifecycle events for orders the book never
//! saw are dropped, counted, and logged at `debug`. Only malformed input and
//! internal invariant breaks surface as [`BookError`].

use thiserror::Error;

use crate::types::Side;

/// Result type alias for book operations.
pub type Result<T> = std::result::Result<T, BookError>;

/// Main error type for book operations.
#[derive(Error, Debug, Clone)]
pub enum BookError {
    /// Invalid order ID (zero is reserved for synthetic orders, and an id
    /// that is already live cannot be added again)
    #[error("Invalid order ID: {0}")]
    InvalidOrderId(u64),

    /// Invalid price (zero or negative)
    #[error("Invalid price: {0}")]
    InvalidPrice(i64),

    /// Invalid size (zero where a positive quantity is required)
    #[error("Invalid size: {0}")]
    InvalidSize(u32),

    /// A message's claimed side disagrees with the order's recorded side.
    /// Indicates corrupted or malformed feed input.
    #[error("Side mismatch for order {order_id}: recorded {recorded:?}, claimed {claimed:?}")]
    SideMismatch {
        order_id: u64,
        recorded: Side,
        claimed: Side,
    },

    /// An execution larger than the order's remaining size
    #[error("Execution of {exec_size} exceeds remaining size {remaining} for order {order_id}")]
    ExecutionExceedsSize {
        order_id: u64,
        exec_size: u32,
        remaining: u32,
    },

    /// Book state inconsistency detected
    #[error("Inconsistent book state: {0}")]
    InconsistentState(String),

    /// Crossed book detected (best bid >= best ask)
    #[error("Crossed book: best_bid={0} >= best_ask={1}")]
    CrossedBook(i64, i64),

    /// Trade-log ingestion failure
    #[cfg(feature = "tradelog")]
    #[error("Trade log error: {0}")]
    TradeLog(String),
}

impl BookError {
    /// Create an `InconsistentState` error from any string-like type.
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        BookError::InconsistentState(msg.into())
    }
}

#[cfg(feature = "tradelog")]
impl From<csv::Error> for BookError {
    fn from(err: csv::Error) -> Self {
        BookError::TradeLog(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BookError::InvalidOrderId(12345);
        assert_eq!(err.to_string(), "Invalid order ID: 12345");
    }

    #[test]
    fn test_side_mismatch_display() {
        let err = BookError::SideMismatch {
            order_id: 7,
            recorded: Side::Bid,
            claimed: Side::Ask,
        };
        assert_eq!(
            err.to_string(),
            "Side mismatch for order 7: recorded Bid, claimed Ask"
        );
    }

    #[test]
    fn test_result_type() {
        let result: Result<i32> = Err(BookError::InvalidPrice(-100));
        assert!(result.is_err());
    }
}
