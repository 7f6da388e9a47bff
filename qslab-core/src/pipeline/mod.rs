//! Strategy pipeline — the collaborator the orchestrator calls on rebalances.
//!
//! The orchestrator only knows [`StrategyPipeline`]. [`QuantTradingSystem`]
//! is the default composition: universe → alpha → allocator → rebalance
//! orders → execution algorithm.

pub mod allocator;
pub mod alpha;
pub mod execution;
pub mod system;
pub mod universe;

pub use allocator::{rebalance_orders, Allocation, Allocator, LongOnlyAllocator, LongShortAllocator};
pub use alpha::{AlphaModel, FixedSignalsAlpha};
pub use execution::{ExecutionAlgorithm, MarketOrderExecution};
pub use system::QuantTradingSystem;
pub use universe::{StaticUniverse, Universe};

use crate::domain::{Order, Symbol};
use crate::portfolio::Portfolio;
use crate::quote::QuoteError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Asset weights keyed by asset id.
pub type Weights = BTreeMap<Symbol, f64>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("negative weight {weight} for {asset} in a long-only portfolio")]
    NegativeWeight { asset: Symbol, weight: f64 },

    #[error("invalid price {price} for {asset}")]
    InvalidPrice { asset: Symbol, price: f64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Quote(#[from] QuoteError),
}

/// What a strategy run produced at one rebalance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyOutput {
    pub orders: Vec<Order>,
    pub target_weights: Weights,
}

/// Alpha, risk and portfolio construction behind a single call.
pub trait StrategyPipeline: Send {
    fn invoke(
        &mut self,
        ts: DateTime<Utc>,
        portfolio: &Portfolio,
    ) -> Result<StrategyOutput, PipelineError>;
}

/// Notified at every market close, before any rebalance at that timestamp.
pub trait SignalRefresh: Send {
    fn on_market_close(&mut self, ts: DateTime<Utc>);
}
