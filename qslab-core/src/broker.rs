//! Simulated broker — order queue, execution rules and portfolio ownership.
//!
//! Orders are queued on submission and resolved on the next [`SimulatedBroker::update`]:
//!
//! - MARKET: buys fill at the ask, sells at the bid.
//! - LIMIT buy: fills at the limit price when the limit lies inside the
//!   quote (`bid <= limit <= ask`).
//! - LIMIT sell: fills at the limit price once `bid >= limit`.
//!
//! A LIMIT order that does not qualify stays queued.
//!
//! Orders are only resolved while the exchange is open. An order submitted
//! outside the session waits for the next one. Once an order has been
//! considered during a session it lives until that session ends; the first
//! update after the close (or on a later trading day) expires it.
//!
//! The broker does not check buying power. Sizing is the strategy's job.

use crate::domain::{IdGen, Order, OrderId, OrderType, PortfolioId, Transaction, TransactionDraft};
use crate::exchange::Exchange;
use crate::fee::{FeeModel, ZeroFeeModel};
use crate::portfolio::{LedgerError, Portfolio, PortfolioSnapshot};
use crate::quote::{Quote, QuoteError, QuoteSource};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("unknown portfolio {0}")]
    UnknownPortfolio(PortfolioId),

    #[error("portfolio {0} already exists")]
    DuplicatePortfolio(PortfolioId),

    #[error("invalid order for {asset}: {reason}")]
    InvalidOrder { asset: String, reason: String },

    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(f64),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// An order waiting in the broker queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub portfolio: PortfolioId,
    pub order: Order,
    /// Trading date of the session in which the order first became eligible.
    pub session: Option<NaiveDate>,
}

/// An order dropped unexecuted at the end of its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredOrder {
    pub id: OrderId,
    pub portfolio: PortfolioId,
    pub order: Order,
    pub expired_at: DateTime<Utc>,
}

pub struct SimulatedBroker {
    exchange: Box<dyn Exchange>,
    quotes: Arc<dyn QuoteSource>,
    fee_model: Box<dyn FeeModel>,
    portfolios: BTreeMap<PortfolioId, Portfolio>,
    pending: BTreeMap<PortfolioId, Vec<PendingOrder>>,
    expired: Vec<ExpiredOrder>,
    ids: IdGen,
    current_dt: DateTime<Utc>,
}

impl SimulatedBroker {
    /// `fee_model` of `None` means zero commission.
    pub fn new(
        start: DateTime<Utc>,
        exchange: Box<dyn Exchange>,
        quotes: Arc<dyn QuoteSource>,
        fee_model: Option<Box<dyn FeeModel>>,
    ) -> Self {
        Self {
            exchange,
            quotes,
            fee_model: fee_model.unwrap_or_else(|| Box::new(ZeroFeeModel)),
            portfolios: BTreeMap::new(),
            pending: BTreeMap::new(),
            expired: Vec::new(),
            ids: IdGen::new(),
            current_dt: start,
        }
    }

    // ── Accounts ───────────────────────────────────────────────────────

    pub fn create_portfolio(
        &mut self,
        id: PortfolioId,
        name: impl Into<String>,
    ) -> Result<(), BrokerError> {
        if self.portfolios.contains_key(&id) {
            return Err(BrokerError::DuplicatePortfolio(id));
        }
        debug!(portfolio = %id, "portfolio created");
        self.pending.insert(id.clone(), Vec::new());
        self.portfolios.insert(id.clone(), Portfolio::new(id, name));
        Ok(())
    }

    pub fn subscribe_funds(&mut self, id: &PortfolioId, amount: f64) -> Result<(), BrokerError> {
        if amount < 0.0 {
            return Err(BrokerError::NegativeAmount(amount));
        }
        let ts = self.current_dt;
        self.portfolio_entry(id)?.deposit(ts, amount)?;
        debug!(portfolio = %id, amount, "funds subscribed");
        Ok(())
    }

    pub fn withdraw_funds(&mut self, id: &PortfolioId, amount: f64) -> Result<(), BrokerError> {
        if amount < 0.0 {
            return Err(BrokerError::NegativeAmount(amount));
        }
        let ts = self.current_dt;
        self.portfolio_entry(id)?.withdraw(ts, amount)?;
        debug!(portfolio = %id, amount, "funds withdrawn");
        Ok(())
    }

    // ── Orders ─────────────────────────────────────────────────────────

    /// Validate and queue an order. It is resolved on the next `update`.
    pub fn submit_order(&mut self, id: &PortfolioId, order: Order) -> Result<OrderId, BrokerError> {
        order.validate().map_err(|reason| BrokerError::InvalidOrder {
            asset: order.asset.clone(),
            reason,
        })?;
        let queue = self
            .pending
            .get_mut(id)
            .ok_or_else(|| BrokerError::UnknownPortfolio(id.clone()))?;
        let order_id = self.ids.next_order_id();
        debug!(
            portfolio = %id,
            order = %order_id,
            asset = %order.asset,
            quantity = order.quantity,
            "order submitted"
        );
        queue.push(PendingOrder {
            id: order_id,
            portfolio: id.clone(),
            order,
            session: None,
        });
        Ok(order_id)
    }

    /// Advance to `ts`: mark every portfolio to market, then resolve the queue.
    ///
    /// Returns the transactions executed during this update, in execution
    /// order (portfolio id, then submission order).
    pub fn update(&mut self, ts: DateTime<Utc>) -> Result<Vec<Transaction>, BrokerError> {
        self.current_dt = ts;

        for portfolio in self.portfolios.values_mut() {
            portfolio.update_market_value(ts, self.quotes.as_ref())?;
        }

        let open = self.exchange.is_open_at(ts);
        let today = ts.date_naive();
        let mut executed = Vec::new();

        for (pid, queue) in self.pending.iter_mut() {
            if queue.is_empty() {
                continue;
            }
            let mut remaining = Vec::with_capacity(queue.len());

            for mut pending in queue.drain(..) {
                let session_over = match pending.session {
                    Some(day) => !open || day != today,
                    None => false,
                };
                if session_over {
                    warn!(
                        portfolio = %pid,
                        order = %pending.id,
                        asset = %pending.order.asset,
                        "order expired unexecuted at session end"
                    );
                    self.expired.push(ExpiredOrder {
                        id: pending.id,
                        portfolio: pending.portfolio,
                        order: pending.order,
                        expired_at: ts,
                    });
                    continue;
                }
                if !open {
                    remaining.push(pending);
                    continue;
                }
                pending.session = Some(today);

                let quote = self.quotes.bid_ask(&pending.order.asset, ts)?;
                let Some(draft) = fill_draft(&pending.order, quote, ts) else {
                    remaining.push(pending);
                    continue;
                };

                let commission = self.fee_model.calculate(&draft).max(0.0);
                let txn = draft.with_commission(commission);
                let portfolio = self
                    .portfolios
                    .get_mut(pid)
                    .ok_or_else(|| BrokerError::UnknownPortfolio(pid.clone()))?;
                portfolio.transact(txn.clone());
                debug!(
                    portfolio = %pid,
                    order = %pending.id,
                    asset = %txn.asset,
                    quantity = txn.quantity,
                    price = txn.price,
                    commission = txn.commission,
                    "order executed"
                );
                executed.push(txn);
            }

            *queue = remaining;
        }

        Ok(executed)
    }

    // ── Valuation & inspection ─────────────────────────────────────────

    /// Total equity per portfolio at the latest marks.
    pub fn get_account_total_equity(&self) -> BTreeMap<PortfolioId, f64> {
        self.portfolios
            .iter()
            .map(|(id, p)| (id.clone(), p.total_equity()))
            .collect()
    }

    /// Sum of total equity over all portfolios.
    pub fn total_equity(&self) -> f64 {
        self.portfolios.values().map(Portfolio::total_equity).sum()
    }

    pub fn snapshot(
        &mut self,
        id: &PortfolioId,
        ts: DateTime<Utc>,
    ) -> Result<PortfolioSnapshot, BrokerError> {
        Ok(self.portfolio_entry(id)?.snapshot(ts).clone())
    }

    pub fn portfolio(&self, id: &PortfolioId) -> Result<&Portfolio, BrokerError> {
        self.portfolios
            .get(id)
            .ok_or_else(|| BrokerError::UnknownPortfolio(id.clone()))
    }

    pub fn portfolios(&self) -> impl Iterator<Item = &Portfolio> {
        self.portfolios.values()
    }

    pub fn pending_orders(&self, id: &PortfolioId) -> Result<&[PendingOrder], BrokerError> {
        self.pending
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| BrokerError::UnknownPortfolio(id.clone()))
    }

    pub fn expired_orders(&self) -> &[ExpiredOrder] {
        &self.expired
    }

    pub fn current_dt(&self) -> DateTime<Utc> {
        self.current_dt
    }

    pub fn fee_model_name(&self) -> &str {
        self.fee_model.name()
    }

    fn portfolio_entry(&mut self, id: &PortfolioId) -> Result<&mut Portfolio, BrokerError> {
        self.portfolios
            .get_mut(id)
            .ok_or_else(|| BrokerError::UnknownPortfolio(id.clone()))
    }
}

impl fmt::Debug for SimulatedBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedBroker")
            .field("fee_model", &self.fee_model.name())
            .field("portfolios", &self.portfolios.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.values().map(Vec::len).sum::<usize>())
            .field("expired", &self.expired.len())
            .field("current_dt", &self.current_dt)
            .finish_non_exhaustive()
    }
}

/// Fill for `order` against `quote`, or `None` if a limit is not met.
fn fill_draft(order: &Order, quote: Quote, ts: DateTime<Utc>) -> Option<TransactionDraft> {
    let buy = order.quantity > 0.0;
    let price = match order.order_type {
        OrderType::Market => {
            if buy {
                quote.ask
            } else {
                quote.bid
            }
        }
        OrderType::Limit { limit_price } => {
            let marketable = if buy {
                quote.bid <= limit_price && limit_price <= quote.ask
            } else {
                quote.bid >= limit_price
            };
            if !marketable {
                return None;
            }
            limit_price
        }
    };
    Some(TransactionDraft {
        timestamp: ts,
        asset: order.asset.clone(),
        quantity: order.quantity,
        price,
    })
}
