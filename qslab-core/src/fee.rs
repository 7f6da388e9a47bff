//! Fee models — commission charged on each executed order.
//!
//! The broker passes a [`TransactionDraft`] (fill price and signed quantity,
//! no commission yet) and books whatever the model returns as a cash debit.

use crate::domain::TransactionDraft;
use serde::{Deserialize, Serialize};

/// Commission calculator. Implementations must return a value `>= 0`.
pub trait FeeModel: Send + Sync {
    fn calculate(&self, draft: &TransactionDraft) -> f64;

    fn name(&self) -> &str;
}

/// No commission at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroFeeModel;

impl FeeModel for ZeroFeeModel {
    fn calculate(&self, _draft: &TransactionDraft) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "zero"
    }
}

/// Percentage of traded notional, plus a tax charged on buys only.
///
/// `commission = |qty * price| * commission_pct + (buy ? |qty * price| * tax_pct : 0)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentFeeModel {
    pub commission_pct: f64,
    pub tax_pct: f64,
}

impl PercentFeeModel {
    pub fn new(commission_pct: f64, tax_pct: f64) -> Self {
        Self {
            commission_pct: commission_pct.max(0.0),
            tax_pct: tax_pct.max(0.0),
        }
    }
}

impl FeeModel for PercentFeeModel {
    fn calculate(&self, draft: &TransactionDraft) -> f64 {
        let notional = draft.notional().abs();
        let commission = notional * self.commission_pct;
        let tax = if draft.quantity > 0.0 {
            notional * self.tax_pct
        } else {
            0.0
        };
        commission + tax
    }

    fn name(&self) -> &str {
        "percent"
    }
}
