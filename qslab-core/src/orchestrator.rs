//! Backtest orchestrator — drives the clock and wires every component.
//!
//! Per clock event, in order:
//! 1. `broker.update(ts)` (mark to market, resolve pending orders)
//! 2. signal refresh on `market_close`
//! 3. strategy invocation if `ts` is a rebalance time, orders submitted
//! 4. equity curve and portfolio snapshot
//!
//! Steps 3 and 4 are skipped before the burn-in timestamp. Hourly rebalancing
//! invokes the strategy on every event regardless of the schedule.

use crate::broker::SimulatedBroker;
use crate::clock::SimulationClock;
use crate::domain::{EventType, PortfolioId, Transaction};
use crate::error::BacktestError;
use crate::exchange::{Exchange, SimulatedExchange};
use crate::fee::FeeModel;
use crate::observer::{SessionObserver, TracingObserver};
use crate::pipeline::{
    AlphaModel, LongOnlyAllocator, LongShortAllocator, QuantTradingSystem, SignalRefresh,
    StrategyPipeline, Universe, Weights,
};
use crate::portfolio::Portfolio;
use crate::quote::QuoteSource;
use crate::schedule::{parse_weekday, RebalanceFrequency, RebalanceSchedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_PORTFOLIO_ID: &str = "000001";
pub const DEFAULT_PORTFOLIO_NAME: &str = "Backtest Simulated Broker Portfolio";
pub const DEFAULT_INITIAL_CASH: f64 = 1_000_000.0;

/// When orders submitted at a rebalance are first offered to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTiming {
    /// On the following clock event.
    #[default]
    NextEvent,
    /// Immediately, against the rebalance timestamp's quotes.
    SameEvent,
}

/// Plain-data description of a backtest session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_portfolio_id")]
    pub portfolio_id: String,
    #[serde(default = "default_portfolio_name")]
    pub portfolio_name: String,
    pub rebalance: RebalanceFrequency,
    #[serde(default)]
    pub rebalance_weekday: Option<String>,
    #[serde(default)]
    pub burn_in: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pre_market: bool,
    #[serde(default)]
    pub post_market: bool,
    #[serde(default)]
    pub long_only: bool,
    #[serde(default)]
    pub cash_buffer_percentage: Option<f64>,
    #[serde(default)]
    pub gross_leverage: Option<f64>,
    #[serde(default)]
    pub execution_timing: ExecutionTiming,
}

fn default_initial_cash() -> f64 {
    DEFAULT_INITIAL_CASH
}

fn default_portfolio_id() -> String {
    DEFAULT_PORTFOLIO_ID.to_string()
}

fn default_portfolio_name() -> String {
    DEFAULT_PORTFOLIO_NAME.to_string()
}

impl SessionSettings {
    /// Settings with every optional field at its default.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, rebalance: RebalanceFrequency) -> Self {
        Self {
            start,
            end,
            initial_cash: DEFAULT_INITIAL_CASH,
            portfolio_id: default_portfolio_id(),
            portfolio_name: default_portfolio_name(),
            rebalance,
            rebalance_weekday: None,
            burn_in: None,
            pre_market: false,
            post_market: false,
            long_only: false,
            cash_buffer_percentage: None,
            gross_leverage: None,
            execution_timing: ExecutionTiming::NextEvent,
        }
    }

    /// Build the rebalance schedule these settings describe.
    pub fn schedule(&self) -> Result<RebalanceSchedule, BacktestError> {
        let weekday = match (&self.rebalance, &self.rebalance_weekday) {
            (RebalanceFrequency::Weekly, Some(day)) => Some(parse_weekday(day)?),
            _ => None,
        };
        Ok(RebalanceSchedule::build(
            self.rebalance,
            self.start,
            self.end,
            weekday,
            self.pre_market,
            self.post_market,
        )?)
    }

    /// The allocator implied by `long_only` and its required parameter.
    fn allocator(&self) -> Result<Box<dyn crate::pipeline::Allocator>, BacktestError> {
        if self.long_only {
            let buffer = self.cash_buffer_percentage.ok_or_else(|| {
                BacktestError::MissingParameter(
                    "long only portfolio specified but no cash buffer percentage supplied".into(),
                )
            })?;
            Ok(Box::new(LongOnlyAllocator::new(buffer)?))
        } else {
            let leverage = self.gross_leverage.ok_or_else(|| {
                BacktestError::MissingParameter(
                    "long/short portfolio specified but no gross leverage supplied".into(),
                )
            })?;
            Ok(Box::new(LongShortAllocator::new(leverage)?))
        }
    }
}

// ── Results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub total_equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPoint {
    pub timestamp: DateTime<Utc>,
    pub weights: Weights,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub events: usize,
    pub rebalances: usize,
    pub orders_submitted: usize,
    pub fills: usize,
}

#[derive(Debug)]
pub struct BacktestResult {
    pub portfolio_id: PortfolioId,
    pub equity_curve: Vec<EquityPoint>,
    pub target_allocations: Vec<AllocationPoint>,
    pub stats: RunStats,
    pub broker: SimulatedBroker,
}

impl BacktestResult {
    /// The session's portfolio.
    pub fn portfolio(&self) -> Result<&Portfolio, BacktestError> {
        Ok(self.broker.portfolio(&self.portfolio_id)?)
    }

    pub fn final_equity(&self) -> f64 {
        self.broker.total_equity()
    }
}

// ── Builder ────────────────────────────────────────────────────────────

/// Collects collaborators for a [`BacktestSession`].
///
/// Either supply a complete [`StrategyPipeline`], or a universe plus alpha
/// model from which the default [`QuantTradingSystem`] is assembled.
pub struct SessionBuilder {
    settings: SessionSettings,
    quotes: Arc<dyn QuoteSource>,
    exchange: Option<Box<dyn Exchange>>,
    fee_model: Option<Box<dyn FeeModel>>,
    universe: Option<Box<dyn Universe>>,
    alpha: Option<Box<dyn AlphaModel>>,
    pipeline: Option<Box<dyn StrategyPipeline>>,
    signals: Option<Box<dyn SignalRefresh>>,
    observer: Option<Box<dyn SessionObserver>>,
}

impl SessionBuilder {
    pub fn new(settings: SessionSettings, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            settings,
            quotes,
            exchange: None,
            fee_model: None,
            universe: None,
            alpha: None,
            pipeline: None,
            signals: None,
            observer: None,
        }
    }

    pub fn exchange(mut self, exchange: Box<dyn Exchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn fee_model(mut self, fee_model: Box<dyn FeeModel>) -> Self {
        self.fee_model = Some(fee_model);
        self
    }

    pub fn universe(mut self, universe: Box<dyn Universe>) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn alpha(mut self, alpha: Box<dyn AlphaModel>) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn pipeline(mut self, pipeline: Box<dyn StrategyPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn signals(mut self, signals: Box<dyn SignalRefresh>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate everything and assemble the session. Fails before any
    /// simulation runs.
    pub fn build(self) -> Result<BacktestSession, BacktestError> {
        let settings = self.settings;
        let mut schedule = settings.schedule()?;
        let clock = SimulationClock::for_frequency(
            &settings.rebalance,
            settings.start,
            settings.end,
            settings.pre_market,
            settings.post_market,
        )?;
        // Buy-and-hold trades on the first recorded clock event, wherever
        // `start` falls relative to the session.
        let first_recorded = settings
            .burn_in
            .map_or(settings.start, |burn_in| burn_in.max(settings.start));
        schedule.align_buy_and_hold(
            clock
                .iter()
                .map(|e| e.timestamp)
                .take_while(|ts| *ts <= settings.end),
            first_recorded,
        );

        let pipeline: Box<dyn StrategyPipeline> = match self.pipeline {
            Some(pipeline) => pipeline,
            None => {
                let universe = self.universe.ok_or_else(|| {
                    BacktestError::MissingParameter("a universe or a strategy pipeline".into())
                })?;
                let alpha = self.alpha.ok_or_else(|| {
                    BacktestError::MissingParameter("an alpha model or a strategy pipeline".into())
                })?;
                Box::new(QuantTradingSystem::new(
                    universe,
                    alpha,
                    settings.allocator()?,
                    Arc::clone(&self.quotes),
                ))
            }
        };

        let exchange = self
            .exchange
            .unwrap_or_else(|| Box::new(SimulatedExchange::new()));
        let mut broker =
            SimulatedBroker::new(settings.start, exchange, Arc::clone(&self.quotes), self.fee_model);
        let portfolio_id = PortfolioId::new(settings.portfolio_id.clone());
        broker.create_portfolio(portfolio_id.clone(), settings.portfolio_name.clone())?;
        broker.subscribe_funds(&portfolio_id, settings.initial_cash)?;

        Ok(BacktestSession {
            settings,
            clock,
            schedule,
            broker,
            portfolio_id,
            pipeline,
            signals: self.signals,
            observer: self
                .observer
                .unwrap_or_else(|| Box::new(TracingObserver)),
        })
    }
}

// ── Session ────────────────────────────────────────────────────────────

/// A fully wired backtest, ready to run once.
pub struct BacktestSession {
    settings: SessionSettings,
    clock: SimulationClock,
    schedule: RebalanceSchedule,
    broker: SimulatedBroker,
    portfolio_id: PortfolioId,
    pipeline: Box<dyn StrategyPipeline>,
    signals: Option<Box<dyn SignalRefresh>>,
    observer: Box<dyn SessionObserver>,
}

impl fmt::Debug for BacktestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktestSession")
            .field("settings", &self.settings)
            .field("rebalances", &self.schedule.len())
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

impl BacktestSession {
    pub fn builder(settings: SessionSettings, quotes: Arc<dyn QuoteSource>) -> SessionBuilder {
        SessionBuilder::new(settings, quotes)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn schedule(&self) -> &RebalanceSchedule {
        &self.schedule
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    fn is_rebalance_event(&self, ts: DateTime<Utc>) -> bool {
        match self.settings.rebalance {
            RebalanceFrequency::Hourly => true,
            _ => self.schedule.contains(ts),
        }
    }

    fn is_recording(&self, ts: DateTime<Utc>) -> bool {
        self.settings.burn_in.map_or(true, |burn_in| ts >= burn_in)
    }

    /// Run the whole clock. Any error aborts the run and no partial result
    /// is returned.
    pub fn run(mut self) -> Result<BacktestResult, BacktestError> {
        let mut equity_curve = Vec::new();
        let mut target_allocations = Vec::new();
        let mut stats = RunStats::default();

        self.observer.on_start(self.settings.start, self.settings.end);

        let clock = self.clock.clone();
        for event in clock.iter() {
            let ts = event.timestamp;
            self.observer.on_event(&event);

            let fills = self.broker.update(ts)?;
            self.record_fills(ts, &fills, &mut stats);

            if event.event_type == EventType::MarketClose {
                if let Some(signals) = self.signals.as_mut() {
                    signals.on_market_close(ts);
                }
            }

            let recording = self.is_recording(ts);
            if recording && self.is_rebalance_event(ts) {
                let output = {
                    let portfolio = self.broker.portfolio(&self.portfolio_id)?;
                    self.pipeline.invoke(ts, portfolio)?
                };
                self.observer.on_rebalance(ts, output.orders.len());
                for order in output.orders {
                    self.broker.submit_order(&self.portfolio_id, order)?;
                    stats.orders_submitted += 1;
                }
                target_allocations.push(AllocationPoint {
                    timestamp: ts,
                    weights: output.target_weights,
                });
                stats.rebalances += 1;

                if self.settings.execution_timing == ExecutionTiming::SameEvent {
                    let fills = self.broker.update(ts)?;
                    self.record_fills(ts, &fills, &mut stats);
                }
            }

            if recording {
                equity_curve.push(EquityPoint {
                    timestamp: ts,
                    total_equity: self.broker.total_equity(),
                });
                self.broker.snapshot(&self.portfolio_id, ts)?;
            }
            stats.events += 1;
        }

        self.observer
            .on_finish(stats.events, self.broker.total_equity());

        Ok(BacktestResult {
            portfolio_id: self.portfolio_id,
            equity_curve,
            target_allocations,
            stats,
            broker: self.broker,
        })
    }

    fn record_fills(&mut self, ts: DateTime<Utc>, fills: &[Transaction], stats: &mut RunStats) {
        if fills.is_empty() {
            return;
        }
        stats.fills += fills.len();
        self.observer.on_fills(ts, fills);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FixedSignalsAlpha, PipelineError, StaticUniverse, StrategyOutput};
    use crate::quote::{Quote, QuoteBook};
    use crate::schedule::ScheduleError;
    use chrono::TimeZone;

    fn ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, d, h, m, 0).unwrap()
    }

    fn flat_quotes() -> Arc<QuoteBook> {
        let mut book = QuoteBook::new();
        book.insert("EQ:ABC", ts(1, 0, 0), Quote::flat(100.0));
        Arc::new(book)
    }

    struct NoTrades;

    impl StrategyPipeline for NoTrades {
        fn invoke(
            &mut self,
            _ts: DateTime<Utc>,
            _portfolio: &Portfolio,
        ) -> Result<StrategyOutput, PipelineError> {
            Ok(StrategyOutput::default())
        }
    }

    #[test]
    fn weekly_without_weekday_fails_at_build() {
        let settings = SessionSettings::new(ts(1, 0, 0), ts(31, 23, 59), RebalanceFrequency::Weekly);
        let err = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::Schedule(ScheduleError::MissingParameter(_))
        ));
    }

    #[test]
    fn long_only_without_buffer_fails_at_build() {
        let mut settings = SessionSettings::new(ts(1, 0, 0), ts(31, 23, 59), RebalanceFrequency::Daily);
        settings.long_only = true;
        let err = BacktestSession::builder(settings, flat_quotes())
            .universe(Box::new(StaticUniverse::new(["EQ:ABC"])))
            .alpha(Box::new(FixedSignalsAlpha::new(Weights::new())))
            .build()
            .unwrap_err();
        assert!(err.is_missing_parameter());
    }

    #[test]
    fn long_short_without_leverage_fails_at_build() {
        let settings = SessionSettings::new(ts(1, 0, 0), ts(31, 23, 59), RebalanceFrequency::Daily);
        let err = BacktestSession::builder(settings, flat_quotes())
            .universe(Box::new(StaticUniverse::new(["EQ:ABC"])))
            .alpha(Box::new(FixedSignalsAlpha::new(Weights::new())))
            .build()
            .unwrap_err();
        assert!(matches!(err, BacktestError::MissingParameter(_)));
    }

    #[test]
    fn reversed_range_fails_at_build() {
        let settings = SessionSettings::new(ts(31, 0, 0), ts(1, 0, 0), RebalanceFrequency::Daily);
        let err = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap_err();
        assert!(matches!(err, BacktestError::Schedule(ScheduleError::InvalidRange { .. })));
    }

    #[test]
    fn bad_weekday_fails_at_build() {
        let mut settings =
            SessionSettings::new(ts(1, 0, 0), ts(31, 23, 59), RebalanceFrequency::Weekly);
        settings.rebalance_weekday = Some("WEDS".into());
        let err = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap_err();
        assert!(matches!(err, BacktestError::Schedule(ScheduleError::InvalidWeekday(_))));
    }

    #[test]
    fn burn_in_suppresses_recording() {
        let mut settings = SessionSettings::new(ts(1, 0, 0), ts(4, 23, 59), RebalanceFrequency::Daily);
        settings.burn_in = Some(ts(3, 0, 0));
        let result = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap()
            .run()
            .unwrap();
        // Jan 1-4 2019 are Tue-Fri: 8 events, 4 after burn-in
        assert_eq!(result.stats.events, 8);
        assert_eq!(result.equity_curve.len(), 4);
        assert_eq!(result.equity_curve[0].timestamp, ts(3, 14, 30));
        assert_eq!(result.stats.rebalances, 2);
        assert_eq!(result.portfolio().unwrap().history().len(), 4);
    }

    #[test]
    fn buy_and_hold_schedule_snaps_to_clock() {
        let settings = SessionSettings::new(ts(1, 0, 0), ts(4, 23, 59), RebalanceFrequency::BuyAndHold);
        let session = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap();
        assert!(session.schedule().contains(ts(1, 14, 30)));
        assert_eq!(session.schedule().len(), 1);

        let result = session.run().unwrap();
        assert_eq!(result.stats.rebalances, 1);
    }

    #[test]
    fn buy_and_hold_on_a_weekend_only_window_never_rebalances() {
        let settings = SessionSettings::new(ts(5, 0, 0), ts(6, 23, 59), RebalanceFrequency::BuyAndHold);
        let session = BacktestSession::builder(settings, flat_quotes())
            .pipeline(Box::new(NoTrades))
            .build()
            .unwrap();
        assert!(session.schedule().is_empty());
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let json = r#"{
            "start": "2019-01-01T00:00:00Z",
            "end": "2019-01-31T23:59:00Z",
            "rebalance": "weekly",
            "rebalance_weekday": "WED"
        }"#;
        let settings: SessionSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.initial_cash, DEFAULT_INITIAL_CASH);
        assert_eq!(settings.portfolio_id, DEFAULT_PORTFOLIO_ID);
        assert_eq!(settings.execution_timing, ExecutionTiming::NextEvent);
        assert_eq!(settings.schedule().unwrap().len(), 5);
    }
}
