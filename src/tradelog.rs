//! Trade-log ingestion and realized PnL.
//!
//! Out-of-band utilities around the core book: read
//! `TIMESTAMP,SYMBOL,BUY_OR_SELL,PRICE,QUANTITY` CSV logs and fold them
//! through a FIFO lot-matching realized-PnL accumulator. These are simple,
//! trivially-stateful collaborators; the book itself never touches them.
//!
//! Requires the `tradelog` feature (enabled by default).
//!
//! # Example
//!
//! ```
//! use lob_reconciler::tradelog::{read_trade_log, realized_pnl};
//!
//! let csv = "\
//! TIMESTAMP,SYMBOL,BUY_OR_SELL,PRICE,QUANTITY
//! 101,TFS,B,11.00,15
//! 102,TFS,B,12.50,15
//! 103,TFS,S,13.00,20
//! 104,TFS,S,12.75,10
//! ";
//! let trades = read_trade_log(csv.as_bytes()).unwrap();
//! let records = realized_pnl(&trades);
//! assert_eq!(records[3].to_csv_line(), "104,TFS,2.50");
//! ```

use std::collections::VecDeque;
use std::io::Read;

use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::types::Side;

fn side_from_code<'de, D>(deserializer: D) -> std::result::Result<Side, D::Error>
where
    D: Deserializer<'de>,
{
    let code = String::deserialize(deserializer)?;
    match code.as_str() {
        "B" => Ok(Side::Bid),
        "S" => Ok(Side::Ask),
        other => Err(serde::de::Error::custom(format!(
            "bad BUY_OR_SELL code {other:?}"
        ))),
    }
}

/// One row of a trade log. `Side::Bid` is a buy, `Side::Ask` a sell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "TIMESTAMP")]
    pub ts: u64,
    #[serde(rename = "SYMBOL")]
    pub symbol: String,
    #[serde(rename = "BUY_OR_SELL", deserialize_with = "side_from_code")]
    pub side: Side,
    #[serde(rename = "PRICE")]
    pub price: f64,
    #[serde(rename = "QUANTITY")]
    pub size: u32,
}

/// Read a trade log in `TIMESTAMP,SYMBOL,BUY_OR_SELL,PRICE,QUANTITY` format.
pub fn read_trade_log<R: Read>(reader: R) -> Result<Vec<TradeRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut trades = Vec::new();
    for row in csv_reader.deserialize() {
        trades.push(row?);
    }
    Ok(trades)
}

/// Realized PnL attributed to one trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlRecord {
    pub ts: u64,
    pub symbol: String,
    pub pnl: f64,
}

impl PnlRecord {
    /// Render as `ts,symbol,pnl` with two decimals (e.g. `104,TFS,2.50`).
    pub fn to_csv_line(&self) -> String {
        format!("{},{},{:.2}", self.ts, self.symbol, self.pnl)
    }
}

/// FIFO lot-matching realized-PnL accumulator for one symbol.
///
/// Buys open long lots; sells close them oldest-first, realizing
/// `(sell - buy) * qty`. Selling past the long inventory opens short lots,
/// closed symmetrically by later buys.
#[derive(Debug, Clone, Default)]
pub struct PnlTracker {
    longs: VecDeque<(f64, u32)>,
    shorts: VecDeque<(f64, u32)>,
    realized: f64,
}

impl PnlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one trade; returns the PnL realized by this trade alone.
    pub fn apply(&mut self, trade: &TradeRecord) -> f64 {
        match trade.side {
            Side::Bid => self.buy(trade.price, trade.size),
            Side::Ask => self.sell(trade.price, trade.size),
        }
    }

    fn buy(&mut self, price: f64, mut size: u32) -> f64 {
        let mut realized = 0.0;
        while size > 0 {
            match self.shorts.front_mut() {
                Some((short_price, short_size)) => {
                    let matched = size.min(*short_size);
                    realized += (*short_price - price) * matched as f64;
                    *short_size -= matched;
                    size -= matched;
                    if *short_size == 0 {
                        self.shorts.pop_front();
                    }
                }
                None => {
                    self.longs.push_back((price, size));
                    size = 0;
                }
            }
        }
        self.realized += realized;
        realized
    }

    fn sell(&mut self, price: f64, mut size: u32) -> f64 {
        let mut realized = 0.0;
        while size > 0 {
            match self.longs.front_mut() {
                Some((long_price, long_size)) => {
                    let matched = size.min(*long_size);
                    realized += (price - *long_price) * matched as f64;
                    *long_size -= matched;
                    size -= matched;
                    if *long_size == 0 {
                        self.longs.pop_front();
                    }
                }
                None => {
                    self.shorts.push_back((price, size));
                    size = 0;
                }
            }
        }
        self.realized += realized;
        realized
    }

    /// Total realized PnL across all applied trades.
    #[inline]
    pub fn realized(&self) -> f64 {
        self.realized
    }

    /// Net open position: positive long, negative short.
    pub fn open_position(&self) -> i64 {
        let long: i64 = self.longs.iter().map(|&(_, s)| s as i64).sum();
        let short: i64 = self.shorts.iter().map(|&(_, s)| s as i64).sum();
        long - short
    }
}

/// Fold a trade sequence into per-trade realized-PnL records, tracking each
/// symbol independently.
pub fn realized_pnl(trades: &[TradeRecord]) -> Vec<PnlRecord> {
    let mut trackers: AHashMap<&str, PnlTracker> = AHashMap::new();
    trades
        .iter()
        .map(|trade| {
            let tracker = trackers.entry(trade.symbol.as_str()).or_default();
            PnlRecord {
                ts: trade.ts,
                symbol: trade.symbol.clone(),
                pnl: tracker.apply(trade),
            }
        })
        .collect()
}
