//! qslab CLI — run backtests and replay saved ledgers.
//!
//! Commands:
//! - `run`: execute one or more backtests from TOML config files
//! - `replay`: rebuild a portfolio from a saved `ledger.json`
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qslab_core::domain::PortfolioId;
use qslab_core::{Portfolio, Position};
use qslab_runner::{
    fingerprint, generate_report, load_ledger, run_backtest, run_batch, save_artifacts,
    BacktestConfig, BacktestReport,
};

#[derive(Parser)]
#[command(name = "qslab", about = "qslab CLI — event-driven portfolio backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute backtests from TOML config files. Several configs run in parallel.
    Run {
        /// Path to a TOML config file (repeatable).
        #[arg(long, required = true)]
        config: Vec<PathBuf>,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the Markdown report instead of the one-line summary.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Rebuild a portfolio from a saved ledger and print its state.
    Replay {
        /// Path to a `ledger.json` written by `run`.
        #[arg(long)]
        ledger: PathBuf,

        /// Print the per-asset summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            report,
        } => run_cmd(&config, &output_dir, report),
        Commands::Replay { ledger, json } => replay_cmd(&ledger, json),
    }
}

fn run_cmd(config_paths: &[PathBuf], output_dir: &Path, report: bool) -> Result<()> {
    let configs = config_paths
        .iter()
        .map(|path| {
            BacktestConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let results = if configs.len() == 1 {
        vec![run_backtest(&configs[0])]
    } else {
        info!(runs = configs.len(), "running batch");
        run_batch(&configs)
    };

    let mut failures = 0;
    for (path, result) in config_paths.iter().zip(results) {
        match result {
            Ok(result) => {
                let run_dir = save_artifacts(&result, output_dir)?;
                print_summary(&result, report)?;
                println!("Artifacts saved to: {}", run_dir.display());
            }
            Err(e) => {
                warn!(config = %path.display(), error = %e, "backtest failed");
                eprintln!("Error for {}: {e}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} backtests failed", config_paths.len());
    }
    Ok(())
}

fn print_summary(result: &BacktestReport, report: bool) -> Result<()> {
    if report {
        print!("{}", generate_report(result));
    } else {
        let s = &result.summary;
        println!(
            "{} {}..{} rebalance={} equity={:.2} return={:.2}% fills={} commission={:.2}",
            s.portfolio_id,
            s.start.format("%Y-%m-%d"),
            s.end.format("%Y-%m-%d"),
            s.rebalance,
            s.final_equity,
            s.total_return * 100.0,
            s.stats.fills,
            s.total_commission,
        );
    }
    println!("Fingerprint: {}", fingerprint(result)?);
    Ok(())
}

fn replay_cmd(ledger: &Path, json: bool) -> Result<()> {
    let portfolio = replay_ledger(ledger)?;

    if json {
        let summary = serde_json::to_string_pretty(&portfolio.to_summary())
            .context("failed to serialize replayed positions")?;
        println!("{summary}");
        return Ok(());
    }

    println!("Entries: {}", portfolio.journal().len());
    println!("Cash: {:.2}", portfolio.cash());
    println!("Commission: {:.2}", portfolio.total_commission());
    println!("Realized P&L: {:.2}", portfolio.total_realized_pnl());
    for (asset, pos) in portfolio.positions() {
        if let Some(side) = position_side(pos) {
            println!(
                "{asset}: {side} quantity={} avg_price={:.4} last_price={:.4}",
                pos.quantity, pos.avg_price, pos.current_price
            );
        }
    }
    Ok(())
}

fn position_side(pos: &Position) -> Option<&'static str> {
    if pos.is_long() {
        Some("long")
    } else if pos.is_short() {
        Some("short")
    } else {
        None
    }
}

fn replay_ledger(path: &Path) -> Result<Portfolio> {
    let journal = load_ledger(path)?;
    let name = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string());
    Portfolio::replay(PortfolioId::new(name.clone()), name, &journal)
        .with_context(|| format!("failed to replay {}", path.display()))
}
