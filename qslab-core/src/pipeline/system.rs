//! Default quant trading system.

use super::{
    rebalance_orders, Allocator, AlphaModel, ExecutionAlgorithm, MarketOrderExecution,
    PipelineError, StrategyOutput, StrategyPipeline, Universe,
};
use crate::portfolio::Portfolio;
use crate::quote::QuoteSource;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Universe → alpha → allocator → rebalance orders → execution algorithm.
pub struct QuantTradingSystem {
    universe: Box<dyn Universe>,
    alpha: Box<dyn AlphaModel>,
    allocator: Box<dyn Allocator>,
    execution: Box<dyn ExecutionAlgorithm>,
    quotes: Arc<dyn QuoteSource>,
}

impl QuantTradingSystem {
    /// Uses [`MarketOrderExecution`]; see [`Self::with_execution`].
    pub fn new(
        universe: Box<dyn Universe>,
        alpha: Box<dyn AlphaModel>,
        allocator: Box<dyn Allocator>,
        quotes: Arc<dyn QuoteSource>,
    ) -> Self {
        Self {
            universe,
            alpha,
            allocator,
            execution: Box::new(MarketOrderExecution),
            quotes,
        }
    }

    pub fn with_execution(mut self, execution: Box<dyn ExecutionAlgorithm>) -> Self {
        self.execution = execution;
        self
    }
}

impl StrategyPipeline for QuantTradingSystem {
    fn invoke(
        &mut self,
        ts: DateTime<Utc>,
        portfolio: &Portfolio,
    ) -> Result<StrategyOutput, PipelineError> {
        let assets = self.universe.assets(ts);
        let signals = self.alpha.signals(ts, &assets);
        let allocation =
            self.allocator
                .allocate(ts, portfolio.total_equity(), &signals, self.quotes.as_ref())?;

        let current: BTreeMap<_, _> = portfolio
            .positions()
            .iter()
            .filter(|(_, p)| !p.is_flat())
            .map(|(a, p)| (a.clone(), p.quantity))
            .collect();
        let orders = rebalance_orders(ts, &current, &allocation.quantities);
        let orders = self.execution.execute(ts, orders);

        debug!(
            %ts,
            alpha = self.alpha.name(),
            allocator = self.allocator.name(),
            orders = orders.len(),
            "strategy invoked"
        );
        Ok(StrategyOutput {
            orders,
            target_weights: allocation.weights,
        })
    }
}
