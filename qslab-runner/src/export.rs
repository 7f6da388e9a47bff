//! Reporting and export — JSON, CSV and Markdown artifacts.
//!
//! A saved run is a directory holding:
//! - `summary.json`: headline figures with a `schema_version`
//! - `equity.csv`: equity per recorded event
//! - `transactions.json`: every fill in execution order
//! - `allocations.json`: target weights per rebalance
//! - `ledger.json`: the replayable portfolio journal
//!
//! Summaries with an unknown schema version are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use qslab_core::{EquityPoint, LedgerEntry};

use crate::runner::{BacktestReport, RunSummary, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_summary_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize RunSummary to JSON")
}

/// Deserialize a `RunSummary`, rejecting unknown schema versions.
pub fn import_summary_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize RunSummary from JSON")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Export an equity curve as CSV with timestamp and equity columns.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "total_equity"])?;
    for point in equity_curve {
        wtr.write_record([
            point.timestamp.to_rfc3339(),
            format!("{:.2}", point.total_equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Fingerprint ────────────────────────────────────────────────────

/// BLAKE3 over the canonical JSON of the fills and the equity curve.
///
/// Identical inputs give identical fingerprints, so golden runs can be
/// compared by hash.
pub fn fingerprint(report: &BacktestReport) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let txns = serde_json::to_vec(&report.transactions).context("serialize transactions")?;
    let equity = serde_json::to_vec(&report.equity_curve).context("serialize equity curve")?;
    hasher.update(&txns);
    hasher.update(&equity);
    Ok(hasher.finalize().to_hex().to_string())
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one run.
///
/// Creates `{portfolio_id}_{run_id prefix}/` under `output_dir` and returns
/// its path. Existing files are overwritten.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let s = &report.summary;
    let prefix = s.run_id.get(..12).unwrap_or(&s.run_id);
    let run_dir = output_dir.join(format!("{}_{}", s.portfolio_id, prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("summary.json"), &export_summary_json(s)?)?;
    write(&run_dir.join("equity.csv"), &export_equity_csv(&report.equity_curve)?)?;
    write(
        &run_dir.join("transactions.json"),
        &serde_json::to_string_pretty(&report.transactions)?,
    )?;
    write(
        &run_dir.join("allocations.json"),
        &serde_json::to_string_pretty(&report.target_allocations)?,
    )?;
    write(
        &run_dir.join("ledger.json"),
        &serde_json::to_string_pretty(&report.journal)?,
    )?;

    Ok(run_dir)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Load the summary from an artifact directory.
pub fn load_summary(dir: &Path) -> Result<RunSummary> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_summary_json(&json)
}

/// Load a journal written by [`save_artifacts`].
pub fn load_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("failed to parse ledger {}", path.display()))
}

// ─── Markdown ───────────────────────────────────────────────────────

/// Human-readable single-run report.
pub fn generate_report(report: &BacktestReport) -> String {
    let s = &report.summary;
    let mut md = String::with_capacity(1024);

    md.push_str("# Backtest Report\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Portfolio | {} |\n", s.portfolio_id));
    md.push_str(&format!("| Period | {} to {} |\n", s.start, s.end));
    md.push_str(&format!("| Rebalance | {} |\n", s.rebalance));
    md.push_str(&format!("| Fee Model | {} |\n", s.fee_model));
    md.push_str(&format!("| Initial Cash | {:.2} |\n", s.initial_cash));
    md.push_str(&format!("| Final Equity | {:.2} |\n", s.final_equity));
    md.push_str(&format!("| Total Return | {:.2}% |\n", s.total_return * 100.0));
    md.push_str(&format!("| Realized P&L | {:.2} |\n", s.realized_pnl));
    md.push_str(&format!("| Unrealized P&L | {:.2} |\n", s.unrealized_pnl));
    md.push_str(&format!("| Commission | {:.2} |\n", s.total_commission));
    md.push_str(&format!(
        "| Events / Rebalances / Fills | {} / {} / {} |\n",
        s.stats.events, s.stats.rebalances, s.stats.fills
    ));
    if s.expired_orders > 0 {
        md.push_str(&format!("| Expired Orders | {} |\n", s.expired_orders));
    }
    md.push_str(&format!("| Dataset Hash | {} |\n", s.dataset_hash));
    md.push('\n');

    if !s.positions.is_empty() {
        md.push_str("## Positions\n\n");
        md.push_str("| Asset | Quantity | Market Value | Realized | Unrealized | Total |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- |\n");
        for (asset, p) in &s.positions {
            md.push_str(&format!(
                "| {asset} | {} | {:.2} | {:.2} | {:.2} | {:.2} |\n",
                p.quantity, p.market_value, p.realized_pnl, p.unrealised_pnl, p.total_pnl
            ));
        }
        md.push('\n');
    }

    md
}
