//! Backtest runner — wires configuration, quote data and the orchestrator.
//!
//! Entry points:
//! - `run_backtest()`: loads CSV data for the config, then runs. Used by the CLI.
//! - `run_backtest_with_quotes()`: takes a pre-loaded quote book, no I/O.
//! - `run_batch()`: independent configs in parallel, one broker per session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use qslab_core::domain::Transaction;
use qslab_core::pipeline::{FixedSignalsAlpha, StaticUniverse};
use qslab_core::portfolio::AssetSummary;
use qslab_core::{
    AllocationPoint, BacktestError, BacktestSession, EquityPoint, LedgerEntry, QuoteBook,
    RebalanceFrequency, RunStats,
};

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{CsvDailyBarSource, LoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Headline figures of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub portfolio_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rebalance: RebalanceFrequency,
    pub fee_model: String,
    pub initial_cash: f64,
    pub final_cash: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_commission: f64,
    pub stats: RunStats,
    pub expired_orders: usize,
    pub dataset_hash: String,
    pub positions: BTreeMap<String, AssetSummary>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything a run produces, detached from the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub summary: RunSummary,
    pub equity_curve: Vec<EquityPoint>,
    pub target_allocations: Vec<AllocationPoint>,
    pub transactions: Vec<Transaction>,
    pub journal: Vec<LedgerEntry>,
}

/// Run a single backtest from a config, loading quotes from its CSV directory.
pub fn run_backtest(config: &BacktestConfig) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let source = CsvDailyBarSource::new(&config.data.csv_dir);
    let loaded = source.load(&config.strategy.assets)?;
    run_backtest_with_quotes(config, Arc::new(loaded.book), &loaded.dataset_hash)
}

/// Run a backtest against pre-loaded quotes.
pub fn run_backtest_with_quotes(
    config: &BacktestConfig,
    quotes: Arc<QuoteBook>,
    dataset_hash: &str,
) -> Result<BacktestReport, RunError> {
    let run_id = config.run_id()?;
    let settings = config.session_settings();
    info!(
        run_id = %&run_id[..12],
        rebalance = %settings.rebalance,
        assets = config.strategy.assets.len(),
        "starting backtest"
    );

    let session = BacktestSession::builder(settings, quotes)
        .universe(Box::new(StaticUniverse::new(
            config.strategy.assets.iter().cloned(),
        )))
        .alpha(Box::new(FixedSignalsAlpha::new(
            config.strategy.weights.clone(),
        )))
        .fee_model(config.fees.build())
        .build()?;
    let result = session.run()?;

    let portfolio = result.portfolio()?;
    let transactions = portfolio.transactions().to_vec();
    let journal = portfolio.journal().to_vec();
    let initial_cash = config.backtest.initial_cash;
    let final_equity = portfolio.total_equity();
    let total_return = if initial_cash > 0.0 {
        final_equity / initial_cash - 1.0
    } else {
        0.0
    };

    let summary = RunSummary {
        schema_version: SCHEMA_VERSION,
        run_id,
        portfolio_id: portfolio.id().to_string(),
        start: config.backtest.start,
        end: config.backtest.end,
        rebalance: config.backtest.rebalance,
        fee_model: result.broker.fee_model_name().to_string(),
        initial_cash,
        final_cash: portfolio.cash(),
        final_equity,
        total_return,
        realized_pnl: portfolio.total_realized_pnl(),
        unrealized_pnl: portfolio.total_unrealized_pnl(),
        total_commission: portfolio.total_commission(),
        stats: result.stats,
        expired_orders: result.broker.expired_orders().len(),
        dataset_hash: dataset_hash.to_string(),
        positions: portfolio.to_summary(),
    };
    info!(
        final_equity,
        total_return,
        fills = summary.stats.fills,
        "backtest complete"
    );

    Ok(BacktestReport {
        summary,
        transactions,
        journal,
        equity_curve: result.equity_curve,
        target_allocations: result.target_allocations,
    })
}

/// Run independent configs in parallel. Results keep the input order.
pub fn run_batch(configs: &[BacktestConfig]) -> Vec<Result<BacktestReport, RunError>> {
    configs.par_iter().map(run_backtest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use qslab_core::calendar::{self, MARKET_CLOSE, MARKET_OPEN};
    use qslab_core::Quote;

    fn book() -> Arc<QuoteBook> {
        let mut book = QuoteBook::new();
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2019, 1, 31).unwrap();
        for (i, day) in calendar::business_days(start, end).enumerate() {
            let p = 100.0 + i as f64;
            book.insert("EQ:ABC", calendar::at(day, MARKET_OPEN), Quote::flat(p));
            book.insert("EQ:ABC", calendar::at(day, MARKET_CLOSE), Quote::flat(p + 0.5));
        }
        Arc::new(book)
    }

    fn config() -> BacktestConfig {
        BacktestConfig::from_toml(
            r#"
[backtest]
start = "2019-01-01T00:00:00Z"
end = "2019-01-31T23:59:00Z"
initial_cash = 100000.0
rebalance = "end_of_month"

[strategy]
assets = ["EQ:ABC"]
weights = { "EQ:ABC" = 1.0 }
long_only = true
cash_buffer_percentage = 0.0

[data]
csv_dir = "unused"
"#,
        )
        .unwrap()
    }

    #[test]
    fn end_of_month_rebalance_trades_once() {
        let report = run_backtest_with_quotes(&config(), book(), "h").unwrap();
        assert_eq!(report.summary.stats.rebalances, 1);
        assert_eq!(
            report.target_allocations[0].timestamp,
            Utc.with_ymd_and_hms(2019, 1, 31, 21, 0, 0).unwrap()
        );
        // The order is pending at the last event and never fills.
        assert!(report.transactions.is_empty());
        assert_eq!(report.summary.final_equity, 100_000.0);
        assert_eq!(report.summary.total_return, 0.0);
        assert_eq!(report.summary.dataset_hash, "h");
    }

    #[test]
    fn summary_matches_ledger() {
        let mut cfg = config();
        cfg.backtest.rebalance = RebalanceFrequency::Daily;
        let report = run_backtest_with_quotes(&cfg, book(), "h").unwrap();

        assert!(!report.transactions.is_empty());
        let s = &report.summary;
        assert!(
            (s.final_equity - (s.initial_cash + s.realized_pnl + s.unrealized_pnl
                - s.total_commission))
                .abs()
                < 1e-6
        );
        assert_eq!(s.stats.fills, report.transactions.len());
        assert_eq!(s.fee_model, "zero");
        assert_eq!(
            report.journal.len(),
            report.transactions.len() + 1,
            "one deposit plus one entry per fill"
        );
    }

    #[test]
    fn missing_data_dir_is_a_data_error() {
        let mut cfg = config();
        cfg.data.csv_dir = std::env::temp_dir().join("qslab-no-such-dir");
        assert!(matches!(run_backtest(&cfg), Err(RunError::Data(_))));
    }
}
