//! Alpha models — forecast weights per asset.

use super::Weights;
use crate::domain::Symbol;
use chrono::{DateTime, Utc};

/// Produces raw signal weights for the assets in the universe.
///
/// Weights are not required to be normalised; the allocator handles that.
pub trait AlphaModel: Send + Sync {
    fn signals(&self, ts: DateTime<Utc>, assets: &[Symbol]) -> Weights;

    fn name(&self) -> &str;
}

/// Constant weights, independent of time and market data.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedSignalsAlpha {
    weights: Weights,
}

impl FixedSignalsAlpha {
    pub fn new(weights: Weights) -> Self {
        Self { weights }
    }
}

impl AlphaModel for FixedSignalsAlpha {
    /// Weights for universe members only. Members without a weight get none.
    fn signals(&self, _ts: DateTime<Utc>, assets: &[Symbol]) -> Weights {
        assets
            .iter()
            .filter_map(|a| self.weights.get(a).map(|w| (a.clone(), *w)))
            .collect()
    }

    fn name(&self) -> &str {
        "fixed_signals"
    }
}
