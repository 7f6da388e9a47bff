//! Quote source interface and an in-memory quote book.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("no quote available for {asset} at or before {timestamp}")]
    NoQuoteAvailable {
        asset: String,
        timestamp: DateTime<Utc>,
    },
}

/// Top-of-book bid/ask pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    /// Bid and ask both equal to `price`.
    pub fn flat(price: f64) -> Self {
        Self {
            bid: price,
            ask: price,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Read-only market-data collaborator.
pub trait QuoteSource: Send + Sync {
    /// Latest bid/ask for `asset` at or before `timestamp`.
    fn bid_ask(&self, asset: &str, timestamp: DateTime<Utc>) -> Result<Quote, QuoteError>;
}

/// Per-asset quote time series held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteBook {
    series: BTreeMap<String, BTreeMap<DateTime<Utc>, Quote>>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the quote for `asset` at `timestamp`.
    pub fn insert(&mut self, asset: impl Into<String>, timestamp: DateTime<Utc>, quote: Quote) {
        self.series
            .entry(asset.into())
            .or_default()
            .insert(timestamp, quote);
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of quotes stored for `asset`.
    pub fn len_for(&self, asset: &str) -> usize {
        self.series.get(asset).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(BTreeMap::is_empty)
    }
}

impl QuoteSource for QuoteBook {
    fn bid_ask(&self, asset: &str, timestamp: DateTime<Utc>) -> Result<Quote, QuoteError> {
        self.series
            .get(asset)
            .and_then(|s| s.range(..=timestamp).next_back())
            .map(|(_, q)| *q)
            .ok_or_else(|| QuoteError::NoQuoteAvailable {
                asset: asset.to_string(),
                timestamp,
            })
    }
}
