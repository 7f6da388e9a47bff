//! Portfolio ledger — cash, positions, transactions and a snapshot history.
//!
//! The ledger is mechanical: it never refuses a trade. Cash may go negative
//! through trading; only an explicit withdrawal is checked against cash.
//! The accounting identity `equity == cash + sum(position market values)`
//! holds after every mutation.

pub mod journal;
pub mod position;

pub use journal::LedgerEntry;
pub use position::{Position, QTY_EPSILON};

use crate::domain::{PortfolioId, Symbol, Transaction};
use crate::quote::{QuoteError, QuoteSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(f64),

    #[error("insufficient cash: requested {requested}, available {available}")]
    InsufficientCash { requested: f64, available: f64 },

    #[error("no position recorded for asset {0}")]
    UnknownAsset(Symbol),
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub positions: BTreeMap<Symbol, Position>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_equity: f64,
}

/// Per-asset figures reported by [`Portfolio::to_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub quantity: f64,
    pub book_cost: f64,
    pub market_value: f64,
    pub realized_pnl: f64,
    pub unrealised_pnl: f64,
    pub total_pnl: f64,
}

impl From<&Position> for AssetSummary {
    fn from(pos: &Position) -> Self {
        let realized_pnl = pos.realized_pnl;
        let unrealised_pnl = pos.unrealized_pnl();
        Self {
            quantity: pos.quantity,
            book_cost: pos.book_cost(),
            market_value: pos.market_value(),
            realized_pnl,
            unrealised_pnl,
            total_pnl: realized_pnl + unrealised_pnl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    id: PortfolioId,
    name: String,
    cash: f64,
    total_commission: f64,
    positions: BTreeMap<Symbol, Position>,
    transactions: Vec<Transaction>,
    journal: Vec<LedgerEntry>,
    history: Vec<PortfolioSnapshot>,
}

impl Portfolio {
    pub fn new(id: PortfolioId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cash: 0.0,
            total_commission: 0.0,
            positions: BTreeMap::new(),
            transactions: Vec::new(),
            journal: Vec::new(),
            history: Vec::new(),
        }
    }

    // ── Cash movements ─────────────────────────────────────────────────

    pub fn deposit(&mut self, timestamp: DateTime<Utc>, amount: f64) -> Result<(), LedgerError> {
        check_amount(amount)?;
        self.cash += amount;
        self.journal.push(LedgerEntry::Deposit { timestamp, amount });
        Ok(())
    }

    pub fn withdraw(&mut self, timestamp: DateTime<Utc>, amount: f64) -> Result<(), LedgerError> {
        check_amount(amount)?;
        if amount > self.cash {
            return Err(LedgerError::InsufficientCash {
                requested: amount,
                available: self.cash,
            });
        }
        self.cash -= amount;
        self.journal
            .push(LedgerEntry::Withdrawal { timestamp, amount });
        Ok(())
    }

    // ── Trades ─────────────────────────────────────────────────────────

    /// Book an executed transaction: cash, position and journal.
    ///
    /// Returns the P&L realized by the trade. Commission reduces cash only,
    /// it is not folded into the cost basis.
    pub fn transact(&mut self, txn: Transaction) -> f64 {
        self.cash += txn.cash_delta();
        self.total_commission += txn.commission;
        let realized = self
            .positions
            .entry(txn.asset.clone())
            .or_insert_with(|| Position::new(txn.asset.clone()))
            .apply_fill(txn.quantity, txn.price);
        self.journal.push(LedgerEntry::Trade(txn.clone()));
        self.transactions.push(txn);
        realized
    }

    // ── Valuation ──────────────────────────────────────────────────────

    /// Mark every open position to the quote mid at `timestamp`.
    ///
    /// Quantities and cost basis are untouched. Flat positions are skipped,
    /// so assets no longer held never need a quote.
    pub fn update_market_value(
        &mut self,
        timestamp: DateTime<Utc>,
        quotes: &dyn QuoteSource,
    ) -> Result<(), QuoteError> {
        for (asset, pos) in self.positions.iter_mut() {
            if pos.is_flat() {
                continue;
            }
            let quote = quotes.bid_ask(asset, timestamp)?;
            pos.mark(quote.mid());
        }
        Ok(())
    }

    pub fn total_market_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn total_equity(&self) -> f64 {
        self.cash + self.total_market_value()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    pub fn total_unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_realized_pnl() + self.total_unrealized_pnl()
    }

    // ── History & reporting ────────────────────────────────────────────

    /// Record the current state in the history and return it.
    pub fn snapshot(&mut self, timestamp: DateTime<Utc>) -> &PortfolioSnapshot {
        let snap = PortfolioSnapshot {
            timestamp,
            cash: self.cash,
            positions: self.positions.clone(),
            realized_pnl: self.total_realized_pnl(),
            unrealized_pnl: self.total_unrealized_pnl(),
            total_equity: self.total_equity(),
        };
        self.history.push(snap);
        &self.history[self.history.len() - 1]
    }

    /// Per-asset summary for every asset ever traded.
    pub fn to_summary(&self) -> BTreeMap<Symbol, AssetSummary> {
        self.positions
            .iter()
            .map(|(asset, pos)| (asset.clone(), AssetSummary::from(pos)))
            .collect()
    }

    pub fn asset_summary(&self, asset: &str) -> Result<AssetSummary, LedgerError> {
        self.positions
            .get(asset)
            .map(AssetSummary::from)
            .ok_or_else(|| LedgerError::UnknownAsset(asset.to_string()))
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn id(&self) -> &PortfolioId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn positions(&self) -> &BTreeMap<Symbol, Position> {
        &self.positions
    }

    /// Open (non-flat) position for `asset`.
    pub fn position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset).filter(|p| !p.is_flat())
    }

    /// Signed held quantity, zero when not held.
    pub fn quantity(&self, asset: &str) -> f64 {
        self.position(asset).map_or(0.0, |p| p.quantity)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    pub fn history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if amount < 0.0 || !amount.is_finite() {
        return Err(LedgerError::NegativeAmount(amount));
    }
    Ok(())
}
