//! qslab core — event-driven backtest engine.
//!
//! This crate contains the deterministic simulation core:
//! - Domain types (events, orders, transactions, ids)
//! - Business-day simulation clock at daily or hourly granularity
//! - Rebalance schedules (buy-and-hold, daily, weekly, end-of-month, hourly)
//! - Simulated exchange calendar and quote-source interface
//! - Simulated broker with market/limit execution and pluggable fee models
//! - Portfolio ledger with weighted-average cost basis and a replayable journal
//! - Default strategy pipeline (universe, alpha, allocator, execution algorithm)
//! - Backtest orchestrator with injected observers

pub mod broker;
pub mod calendar;
pub mod clock;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod fee;
pub mod observer;
pub mod orchestrator;
pub mod pipeline;
pub mod portfolio;
pub mod quote;
pub mod schedule;

pub use broker::{BrokerError, ExpiredOrder, PendingOrder, SimulatedBroker};
pub use clock::{ClockError, Granularity, SimulationClock};
pub use error::BacktestError;
pub use exchange::{Exchange, SimulatedExchange};
pub use fee::{FeeModel, PercentFeeModel, ZeroFeeModel};
pub use orchestrator::{
    AllocationPoint, BacktestResult, BacktestSession, EquityPoint, ExecutionTiming, RunStats,
    SessionBuilder, SessionSettings,
};
pub use portfolio::{LedgerEntry, LedgerError, Portfolio, PortfolioSnapshot, Position};
pub use quote::{Quote, QuoteBook, QuoteError, QuoteSource};
pub use schedule::{RebalanceFrequency, RebalanceSchedule, ScheduleError};
