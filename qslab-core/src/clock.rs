//! Simulated market clock.
//!
//! A clock is a finite, strictly time-ordered sequence of [`SimulationEvent`]s
//! over the business days of a date range. Each business day contributes the
//! same list of intraday slots:
//!
//! - Daily granularity: optional pre-market (00:00), market open (14:30),
//!   market close (21:00), optional post-market (23:59).
//! - Hourly granularity: one `market_open` event per whole hour inside the
//!   trading window (15:00 through 21:00 by default).
//!
//! Events are produced lazily. Calling [`SimulationClock::iter`] again starts
//! a fresh pass from the first event.

use crate::calendar::{self, MARKET_CLOSE, MARKET_OPEN, POST_MARKET, PRE_MARKET};
use crate::domain::{EventType, SimulationEvent};
use crate::schedule::RebalanceFrequency;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("invalid range: end {end} is earlier than start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Hourly,
}

/// Business-day clock at daily or hourly granularity. No holiday awareness.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    slots: Vec<((u32, u32), EventType)>,
}

impl SimulationClock {
    /// Daily clock: open and close every business day, with optional
    /// pre-market and post-market events.
    pub fn daily(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pre_market: bool,
        post_market: bool,
    ) -> Result<Self, ClockError> {
        check_range(start, end)?;
        let mut slots = Vec::with_capacity(4);
        if pre_market {
            slots.push((PRE_MARKET, EventType::PreMarket));
        }
        slots.push((MARKET_OPEN, EventType::MarketOpen));
        slots.push((MARKET_CLOSE, EventType::MarketClose));
        if post_market {
            slots.push((POST_MARKET, EventType::PostMarket));
        }
        Ok(Self {
            start,
            end,
            granularity: Granularity::Daily,
            slots,
        })
    }

    /// Hourly clock: a `market_open` event on every whole hour of the trading
    /// window. The flags widen the window as described in
    /// [`calendar::session_hours`].
    pub fn hourly(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pre_market: bool,
        post_market: bool,
    ) -> Result<Self, ClockError> {
        check_range(start, end)?;
        let slots = calendar::session_hours(pre_market, post_market)
            .map(|hour| ((hour, 0), EventType::MarketOpen))
            .collect();
        Ok(Self {
            start,
            end,
            granularity: Granularity::Hourly,
            slots,
        })
    }

    /// The clock a backtest with the given rebalance frequency runs on:
    /// hourly for hourly rebalancing, daily otherwise.
    pub fn for_frequency(
        frequency: &RebalanceFrequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pre_market: bool,
        post_market: bool,
    ) -> Result<Self, ClockError> {
        match frequency {
            RebalanceFrequency::Hourly => Self::hourly(start, end, pre_market, post_market),
            _ => Self::daily(start, end, pre_market, post_market),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Fresh lazy pass over all events.
    pub fn iter(&self) -> ClockEvents<'_> {
        ClockEvents {
            slots: &self.slots,
            day: calendar::next_business_day(self.start.date_naive()),
            last_day: self.end.date_naive(),
            slot: 0,
        }
    }
}

impl<'a> IntoIterator for &'a SimulationClock {
    type Item = SimulationEvent;
    type IntoIter = ClockEvents<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a clock's events.
#[derive(Debug, Clone)]
pub struct ClockEvents<'a> {
    slots: &'a [((u32, u32), EventType)],
    day: Option<NaiveDate>,
    last_day: NaiveDate,
    slot: usize,
}

impl Iterator for ClockEvents<'_> {
    type Item = SimulationEvent;

    fn next(&mut self) -> Option<SimulationEvent> {
        let day = self.day.filter(|d| *d <= self.last_day)?;
        let (time, event_type) = *self.slots.get(self.slot)?;
        let event = SimulationEvent::new(calendar::at(day, time), event_type);

        self.slot += 1;
        if self.slot == self.slots.len() {
            self.slot = 0;
            self.day = day.succ_opt().and_then(calendar::next_business_day);
        }
        Some(event)
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ClockError> {
    if end < start {
        return Err(ClockError::InvalidRange { start, end });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = SimulationClock::daily(ts(2020, 1, 10, 0, 0), ts(2020, 1, 1, 0, 0), true, true);
        assert!(matches!(err, Err(ClockError::InvalidRange { .. })));
        let err = SimulationClock::hourly(ts(2020, 1, 10, 0, 0), ts(2020, 1, 1, 0, 0), false, false);
        assert!(err.is_err());
    }

    #[test]
    fn daily_emits_four_events_per_business_day() {
        // Thu 2 Jan 2020 to Mon 6 Jan 2020: three business days
        let clock = SimulationClock::daily(ts(2020, 1, 2, 0, 0), ts(2020, 1, 6, 0, 0), true, true)
            .unwrap();
        let events: Vec<_> = clock.iter().collect();
        assert_eq!(events.len(), 12);
        assert_eq!(events[0], SimulationEvent::new(ts(2020, 1, 2, 0, 0), EventType::PreMarket));
        assert_eq!(events[1], SimulationEvent::new(ts(2020, 1, 2, 14, 30), EventType::MarketOpen));
        assert_eq!(events[2], SimulationEvent::new(ts(2020, 1, 2, 21, 0), EventType::MarketClose));
        assert_eq!(events[3], SimulationEvent::new(ts(2020, 1, 2, 23, 59), EventType::PostMarket));
        // Weekend skipped
        assert_eq!(events[8].timestamp, ts(2020, 1, 6, 0, 0));
    }

    #[test]
    fn daily_without_pre_and_post_market() {
        let clock = SimulationClock::daily(ts(2020, 1, 2, 0, 0), ts(2020, 1, 3, 0, 0), false, false)
            .unwrap();
        let types: Vec<_> = clock.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::MarketOpen,
                EventType::MarketClose,
                EventType::MarketOpen,
                EventType::MarketClose
            ]
        );
    }

    #[test]
    fn hourly_covers_trading_window_inclusive() {
        let clock = SimulationClock::hourly(ts(2019, 1, 1, 0, 0), ts(2019, 1, 1, 23, 0), false, false)
            .unwrap();
        let hours: Vec<u32> = clock.iter().map(|e| e.timestamp.hour()).collect();
        assert_eq!(hours, vec![15, 16, 17, 18, 19, 20, 21]);
        assert!(clock.iter().all(|e| e.event_type == EventType::MarketOpen));
    }

    #[test]
    fn hourly_pre_market_starts_at_midnight() {
        let clock = SimulationClock::hourly(ts(2019, 1, 1, 0, 0), ts(2019, 1, 1, 23, 0), true, false)
            .unwrap();
        assert_eq!(clock.iter().count(), 22);
        assert_eq!(clock.iter().next().unwrap().timestamp, ts(2019, 1, 1, 0, 0));
    }

    #[test]
    fn events_are_strictly_increasing() {
        let clock = SimulationClock::daily(ts(2019, 1, 1, 0, 0), ts(2019, 3, 31, 0, 0), true, true)
            .unwrap();
        let events: Vec<_> = clock.iter().collect();
        assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn iteration_restarts_from_the_beginning() {
        let clock = SimulationClock::daily(ts(2020, 1, 2, 0, 0), ts(2020, 1, 3, 0, 0), false, false)
            .unwrap();
        let first: Vec<_> = clock.iter().collect();
        let second: Vec<_> = (&clock).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let clock = SimulationClock::daily(ts(2020, 1, 4, 0, 0), ts(2020, 1, 5, 23, 0), true, true)
            .unwrap();
        assert_eq!(clock.iter().count(), 0);
    }

    #[test]
    fn for_frequency_picks_hourly_only_for_hourly() {
        let start = ts(2020, 1, 2, 0, 0);
        let end = ts(2020, 1, 2, 23, 0);
        let hourly =
            SimulationClock::for_frequency(&RebalanceFrequency::Hourly, start, end, false, false)
                .unwrap();
        assert_eq!(hourly.granularity(), Granularity::Hourly);
        let daily =
            SimulationClock::for_frequency(&RebalanceFrequency::Daily, start, end, false, false)
                .unwrap();
        assert_eq!(daily.granularity(), Granularity::Daily);
    }
}
