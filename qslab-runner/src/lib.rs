//! qslab runner — configuration, data loading, batch runs and artifacts.
//!
//! This crate builds on `qslab-core` to provide:
//! - TOML backtest configuration with validation and a content hash
//! - Daily bar CSV loading into a quote book
//! - Single and parallel batch backtest runs
//! - Artifact export (summary, equity curve, fills, allocations, ledger)
//!   and a run fingerprint for golden-output comparison

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{BacktestConfig, ConfigError, FeeModelConfig, RunId};
pub use data_loader::{CsvDailyBarSource, LoadError, LoadedQuotes};
pub use export::{fingerprint, generate_report, load_ledger, load_summary, save_artifacts};
pub use runner::{
    run_backtest, run_backtest_with_quotes, run_batch, BacktestReport, RunError, RunSummary,
    SCHEMA_VERSION,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<BacktestReport>();
        assert_sync::<BacktestReport>();
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
    }

    #[test]
    fn errors_are_send() {
        assert_send::<RunError>();
        assert_send::<LoadError>();
    }
}
