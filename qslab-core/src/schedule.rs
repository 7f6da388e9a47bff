//! Rebalance schedules.
//!
//! Each policy computes its complete, sorted set of rebalance timestamps at
//! construction. Every timestamp lies inside `[start, end]` and is unique.

use crate::calendar::{self, MARKET_CLOSE};
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("invalid range: end {end} is earlier than start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid weekday '{0}' (expected MON, TUE, WED, THU, FRI, SAT or SUN)")]
    InvalidWeekday(String),
}

/// How often the strategy pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    BuyAndHold,
    Daily,
    Weekly,
    EndOfMonth,
    Hourly,
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceFrequency::BuyAndHold => "buy_and_hold",
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::EndOfMonth => "end_of_month",
            RebalanceFrequency::Hourly => "hourly",
        };
        f.write_str(s)
    }
}

/// A rebalance policy: the timestamps on which the strategy pipeline runs.
pub trait Rebalance {
    /// Sorted, unique timestamps inside the backtest window.
    fn rebalances(&self) -> &[DateTime<Utc>];
}

/// Single rebalance at the start of the backtest.
#[derive(Debug, Clone)]
pub struct BuyAndHoldRebalance {
    rebalances: Vec<DateTime<Utc>>,
}

impl BuyAndHoldRebalance {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            rebalances: vec![start],
        }
    }
}

impl Rebalance for BuyAndHoldRebalance {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.rebalances
    }
}

/// Every business day at market close.
#[derive(Debug, Clone)]
pub struct DailyRebalance {
    rebalances: Vec<DateTime<Utc>>,
}

impl DailyRebalance {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ScheduleError> {
        check_range(start, end)?;
        let stamps = calendar::business_days(start.date_naive(), end.date_naive())
            .map(|d| calendar::at(d, MARKET_CLOSE));
        Ok(Self {
            rebalances: finalize(stamps, start, end),
        })
    }
}

impl Rebalance for DailyRebalance {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.rebalances
    }
}

/// Once a week at market close on the given weekday.
#[derive(Debug, Clone)]
pub struct WeeklyRebalance {
    weekday: Weekday,
    rebalances: Vec<DateTime<Utc>>,
}

impl WeeklyRebalance {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        weekday: Option<Weekday>,
    ) -> Result<Self, ScheduleError> {
        let weekday = weekday.ok_or_else(|| {
            ScheduleError::MissingParameter(
                "weekly rebalancing requires a rebalance weekday, e.g. 'WED'".into(),
            )
        })?;
        check_range(start, end)?;
        let stamps = start
            .date_naive()
            .iter_days()
            .take_while(|d| *d <= end.date_naive())
            .filter(|d| d.weekday() == weekday)
            .map(|d| calendar::at(d, MARKET_CLOSE));
        Ok(Self {
            weekday,
            rebalances: finalize(stamps, start, end),
        })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }
}

impl Rebalance for WeeklyRebalance {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.rebalances
    }
}

/// Last business day of every month at market close.
#[derive(Debug, Clone)]
pub struct EndOfMonthRebalance {
    rebalances: Vec<DateTime<Utc>>,
}

impl EndOfMonthRebalance {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ScheduleError> {
        check_range(start, end)?;
        let stamps = calendar::business_days(start.date_naive(), end.date_naive())
            .filter(|d| calendar::last_business_day_of_month(*d) == Some(*d))
            .map(|d| calendar::at(d, MARKET_CLOSE));
        Ok(Self {
            rebalances: finalize(stamps, start, end),
        })
    }
}

impl Rebalance for EndOfMonthRebalance {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.rebalances
    }
}

/// Every whole business hour of every business day.
#[derive(Debug, Clone)]
pub struct HourlyRebalance {
    rebalances: Vec<DateTime<Utc>>,
}

impl HourlyRebalance {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pre_market: bool,
        post_market: bool,
    ) -> Result<Self, ScheduleError> {
        check_range(start, end)?;
        let stamps = calendar::business_days(start.date_naive(), end.date_naive()).flat_map(
            move |d| {
                calendar::session_hours(pre_market, post_market).map(move |h| calendar::at(d, (h, 0)))
            },
        );
        Ok(Self {
            rebalances: finalize(stamps, start, end),
        })
    }
}

impl Rebalance for HourlyRebalance {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.rebalances
    }
}

/// The rebalance timestamps of a backtest plus the frequency that produced them.
#[derive(Debug, Clone)]
pub struct RebalanceSchedule {
    frequency: RebalanceFrequency,
    timestamps: Vec<DateTime<Utc>>,
}

impl RebalanceSchedule {
    /// Build the schedule for a frequency. Weekly schedules need `weekday`.
    pub fn build(
        frequency: RebalanceFrequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        weekday: Option<Weekday>,
        pre_market: bool,
        post_market: bool,
    ) -> Result<Self, ScheduleError> {
        check_range(start, end)?;
        let timestamps = match frequency {
            RebalanceFrequency::BuyAndHold => BuyAndHoldRebalance::new(start).rebalances,
            RebalanceFrequency::Daily => DailyRebalance::new(start, end)?.rebalances,
            RebalanceFrequency::Weekly => WeeklyRebalance::new(start, end, weekday)?.rebalances,
            RebalanceFrequency::EndOfMonth => EndOfMonthRebalance::new(start, end)?.rebalances,
            RebalanceFrequency::Hourly => {
                HourlyRebalance::new(start, end, pre_market, post_market)?.rebalances
            }
        };
        Ok(Self {
            frequency,
            timestamps,
        })
    }

    pub fn frequency(&self) -> RebalanceFrequency {
        self.frequency
    }

    /// Move a buy-and-hold rebalance onto the first of `events` at or after
    /// `not_before`. Other frequencies are left untouched. The schedule is
    /// empty when no event qualifies.
    pub fn align_buy_and_hold(
        &mut self,
        events: impl IntoIterator<Item = DateTime<Utc>>,
        not_before: DateTime<Utc>,
    ) {
        if self.frequency != RebalanceFrequency::BuyAndHold {
            return;
        }
        self.timestamps = events
            .into_iter()
            .find(|ts| *ts >= not_before)
            .into_iter()
            .collect();
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.timestamps.binary_search(&ts).is_ok()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.timestamps.iter()
    }
}

impl Rebalance for RebalanceSchedule {
    fn rebalances(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }
}

/// Parse a weekday abbreviation (`MON`..`SUN`) or full name, case-insensitive.
pub fn parse_weekday(s: &str) -> Result<Weekday, ScheduleError> {
    let lower = s.trim().to_ascii_lowercase();
    let weekday = match lower.as_str() {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return Err(ScheduleError::InvalidWeekday(s.to_string())),
    };
    Ok(weekday)
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ScheduleError> {
    if end < start {
        return Err(ScheduleError::InvalidRange { start, end });
    }
    Ok(())
}

/// Clip to `[start, end]`, sort, dedup.
fn finalize(
    stamps: impl Iterator<Item = DateTime<Utc>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut out: Vec<_> = stamps.filter(|ts| *ts >= start && *ts <= end).collect();
    out.sort();
    out.dedup();
    out
}
