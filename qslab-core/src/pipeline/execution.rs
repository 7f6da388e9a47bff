//! Execution algorithms — turn rebalance orders into broker orders.

use crate::domain::Order;
use chrono::{DateTime, Utc};

pub trait ExecutionAlgorithm: Send + Sync {
    fn execute(&self, ts: DateTime<Utc>, orders: Vec<Order>) -> Vec<Order>;

    fn name(&self) -> &str;
}

/// Pass-through: rebalance orders are sent unchanged as market orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketOrderExecution;

impl ExecutionAlgorithm for MarketOrderExecution {
    fn execute(&self, _ts: DateTime<Utc>, orders: Vec<Order>) -> Vec<Order> {
        orders
    }

    fn name(&self) -> &str {
        "market"
    }
}
