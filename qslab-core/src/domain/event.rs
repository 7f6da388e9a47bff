//! Simulation events emitted by the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which point of the trading day an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PreMarket,
    MarketOpen,
    MarketClose,
    PostMarket,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::PreMarket => "pre_market",
            EventType::MarketOpen => "market_open",
            EventType::MarketClose => "market_close",
            EventType::PostMarket => "post_market",
        };
        f.write_str(s)
    }
}

/// A single tick of the simulated clock.
///
/// Immutable once produced. Two events are equal when both the timestamp and
/// the event type match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl SimulationEvent {
    pub fn new(timestamp: DateTime<Utc>, event_type: EventType) -> Self {
        Self {
            timestamp,
            event_type,
        }
    }
}

impl fmt::Display for SimulationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) - {}", self.timestamp, self.event_type)
    }
}
