//! Append-only ledger journal.
//!
//! Every cash movement and every executed transaction is journaled in order.
//! Replaying a journal into an empty portfolio rebuilds the same cash and
//! positions, which makes the journal the unit of persistence.

use crate::domain::{PortfolioId, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LedgerError, Portfolio};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Deposit {
        timestamp: DateTime<Utc>,
        amount: f64,
    },
    Withdrawal {
        timestamp: DateTime<Utc>,
        amount: f64,
    },
    Trade(Transaction),
}

impl LedgerEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LedgerEntry::Deposit { timestamp, .. } | LedgerEntry::Withdrawal { timestamp, .. } => {
                *timestamp
            }
            LedgerEntry::Trade(txn) => txn.timestamp,
        }
    }

    /// Signed effect on cash.
    pub fn cash_delta(&self) -> f64 {
        match self {
            LedgerEntry::Deposit { amount, .. } => *amount,
            LedgerEntry::Withdrawal { amount, .. } => -amount,
            LedgerEntry::Trade(txn) => txn.cash_delta(),
        }
    }
}

impl Portfolio {
    /// Rebuild a portfolio from scratch by re-applying `journal` in order.
    ///
    /// Positions are left at their last fill price; call
    /// [`Portfolio::update_market_value`] to revalue them.
    pub fn replay(
        id: PortfolioId,
        name: impl Into<String>,
        journal: &[LedgerEntry],
    ) -> Result<Portfolio, LedgerError> {
        let mut portfolio = Portfolio::new(id, name);
        for entry in journal {
            match entry {
                LedgerEntry::Deposit { timestamp, amount } => {
                    portfolio.deposit(*timestamp, *amount)?;
                }
                LedgerEntry::Withdrawal { timestamp, amount } => {
                    portfolio.withdraw(*timestamp, *amount)?;
                }
                LedgerEntry::Trade(txn) => {
                    portfolio.transact(txn.clone());
                }
            }
        }
        Ok(portfolio)
    }
}
