//! Business-day calendar helpers shared by the clock, the rebalance schedules
//! and the simulated exchange.
//!
//! Business days are Monday through Friday. No regional holiday calendar is
//! applied.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use std::ops::RangeInclusive;

/// Regular session open, 14:30 UTC.
pub const MARKET_OPEN: (u32, u32) = (14, 30);
/// Regular session close, 21:00 UTC.
pub const MARKET_CLOSE: (u32, u32) = (21, 0);
/// Pre-market event time, midnight UTC.
pub const PRE_MARKET: (u32, u32) = (0, 0);
/// Post-market event time, 23:59 UTC.
pub const POST_MARKET: (u32, u32) = (23, 59);

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// All business days in `[start, end]`, ascending.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .take_while(move |d| *d <= end)
        .filter(|d| is_business_day(*d))
}

/// First business day on or after `date`.
pub fn next_business_day(date: NaiveDate) -> Option<NaiveDate> {
    date.iter_days().find(|d| is_business_day(*d))
}

/// Last business day of the month containing `date`.
pub fn last_business_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let first_of_next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
    };
    let mut day = first_of_next.pred_opt()?;
    while !is_business_day(day) {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Combine a calendar date and an `(hour, minute)` pair into a UTC timestamp.
pub fn at(date: NaiveDate, (hour, minute): (u32, u32)) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Whole hours whose start lies inside the trading window.
///
/// The regular window is `[14:30, 21:00]`, giving 15:00 through 21:00.
/// `pre_market` widens the window start to midnight and `post_market`
/// widens the end to 23:00.
pub fn session_hours(pre_market: bool, post_market: bool) -> RangeInclusive<u32> {
    let (open_h, open_m) = MARKET_OPEN;
    let first = if pre_market {
        0
    } else if open_m > 0 {
        open_h + 1
    } else {
        open_h
    };
    let last = if post_market { 23 } else { MARKET_CLOSE.0 };
    first..=last
}
