//! Market-calendar oracle consulted by the broker.

use crate::calendar::{self, MARKET_CLOSE, MARKET_OPEN};
use chrono::{DateTime, NaiveDate, Utc};

/// Read-only trading calendar.
pub trait Exchange: Send + Sync {
    /// Whether the exchange trades on this calendar date.
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Session open and close for a trading day, `None` otherwise.
    fn session_bounds(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)>;

    /// Whether `ts` falls inside a trading session (both ends inclusive).
    fn is_open_at(&self, ts: DateTime<Utc>) -> bool {
        match self.session_bounds(ts.date_naive()) {
            Some((open, close)) => ts >= open && ts <= close,
            None => false,
        }
    }
}

/// Monday-Friday exchange with a fixed 14:30-21:00 UTC session and no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExchange;

impl SimulatedExchange {
    pub fn new() -> Self {
        Self
    }
}

impl Exchange for SimulatedExchange {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        calendar::is_business_day(date)
    }

    fn session_bounds(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.is_trading_day(date) {
            return None;
        }
        Some((calendar::at(date, MARKET_OPEN), calendar::at(date, MARKET_CLOSE)))
    }
}
