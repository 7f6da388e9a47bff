//! Allocators — translate signal weights into target share quantities.
//!
//! Allocators are portfolio-aware (they size against total equity) but do not
//! decide which assets to hold. That is the alpha model's job.

use super::{PipelineError, Weights};
use crate::domain::{Order, Symbol};
use crate::quote::QuoteSource;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Output of an allocator: normalised weights and the quantities they imply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Allocation {
    pub weights: Weights,
    pub quantities: BTreeMap<Symbol, f64>,
}

/// Portfolio construction sizing policy.
///
/// # Responsibilities
/// - Normalise raw weights
/// - Convert equity + weights + quotes into whole-share target quantities
///
/// # Non-Responsibilities
/// - Allocators do NOT diff against current holdings
/// - Allocators do NOT choose order types
pub trait Allocator: Send + Sync {
    fn allocate(
        &self,
        ts: DateTime<Utc>,
        equity: f64,
        weights: &Weights,
        quotes: &dyn QuoteSource,
    ) -> Result<Allocation, PipelineError>;

    fn name(&self) -> &str;
}

// ── Long only ──────────────────────────────────────────────────────────

/// Long-only sizing with a cash buffer.
///
/// Weights must be non-negative and are scaled to sum to one. Each asset gets
/// `weight * equity * (1 - cash_buffer_pct)` dollars, bought in whole shares
/// at the ask (rounded down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongOnlyAllocator {
    cash_buffer_pct: f64,
}

impl LongOnlyAllocator {
    pub fn new(cash_buffer_pct: f64) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&cash_buffer_pct) {
            return Err(PipelineError::InvalidParameter(format!(
                "cash buffer percentage must be within [0, 1], got {cash_buffer_pct}"
            )));
        }
        Ok(Self { cash_buffer_pct })
    }

    pub fn cash_buffer_pct(&self) -> f64 {
        self.cash_buffer_pct
    }
}

impl Allocator for LongOnlyAllocator {
    fn allocate(
        &self,
        ts: DateTime<Utc>,
        equity: f64,
        weights: &Weights,
        quotes: &dyn QuoteSource,
    ) -> Result<Allocation, PipelineError> {
        if let Some((asset, weight)) = weights.iter().find(|(_, w)| **w < 0.0) {
            return Err(PipelineError::NegativeWeight {
                asset: asset.clone(),
                weight: *weight,
            });
        }
        let weights = normalise(weights, weights.values().sum());
        let investable = equity.max(0.0) * (1.0 - self.cash_buffer_pct);

        let mut quantities = BTreeMap::new();
        for (asset, weight) in &weights {
            let price = quotes.bid_ask(asset, ts)?.ask;
            check_price(asset, price)?;
            quantities.insert(asset.clone(), (investable * weight / price).floor());
        }
        Ok(Allocation {
            weights,
            quantities,
        })
    }

    fn name(&self) -> &str {
        "long_only"
    }
}

// ── Long / short ───────────────────────────────────────────────────────

/// Leveraged long/short sizing.
///
/// Weights are scaled by the sum of their absolute values, so gross exposure
/// equals `equity * gross_leverage`. Longs are priced at the ask, shorts at
/// the bid, and quantities are truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongShortAllocator {
    gross_leverage: f64,
}

impl LongShortAllocator {
    pub fn new(gross_leverage: f64) -> Result<Self, PipelineError> {
        if !gross_leverage.is_finite() || gross_leverage <= 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "gross leverage must be positive, got {gross_leverage}"
            )));
        }
        Ok(Self { gross_leverage })
    }

    pub fn gross_leverage(&self) -> f64 {
        self.gross_leverage
    }
}

impl Allocator for LongShortAllocator {
    fn allocate(
        &self,
        ts: DateTime<Utc>,
        equity: f64,
        weights: &Weights,
        quotes: &dyn QuoteSource,
    ) -> Result<Allocation, PipelineError> {
        let weights = normalise(weights, weights.values().map(|w| w.abs()).sum());
        let gross = equity.max(0.0) * self.gross_leverage;

        let mut quantities = BTreeMap::new();
        for (asset, weight) in &weights {
            let quote = quotes.bid_ask(asset, ts)?;
            let price = if *weight >= 0.0 { quote.ask } else { quote.bid };
            check_price(asset, price)?;
            quantities.insert(asset.clone(), (gross * weight / price).trunc());
        }
        Ok(Allocation {
            weights,
            quantities,
        })
    }

    fn name(&self) -> &str {
        "long_short"
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn normalise(weights: &Weights, total: f64) -> Weights {
    if total <= 0.0 {
        return weights.keys().map(|a| (a.clone(), 0.0)).collect();
    }
    weights
        .iter()
        .map(|(a, w)| (a.clone(), w / total))
        .collect()
}

fn check_price(asset: &str, price: f64) -> Result<(), PipelineError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(PipelineError::InvalidPrice {
            asset: asset.to_string(),
            price,
        });
    }
    Ok(())
}

/// Orders moving `current` holdings to `target` quantities.
///
/// Assets held but absent from `target` are liquidated. Sells come first so
/// their proceeds are booked before buys, then orders are ordered by asset id.
pub fn rebalance_orders(
    ts: DateTime<Utc>,
    current: &BTreeMap<Symbol, f64>,
    target: &BTreeMap<Symbol, f64>,
) -> Vec<Order> {
    let mut orders: Vec<Order> = current
        .keys()
        .chain(target.keys())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .filter_map(|asset| {
            let have = current.get(asset).copied().unwrap_or(0.0);
            let want = target.get(asset).copied().unwrap_or(0.0);
            let delta = want - have;
            (delta.abs() > crate::portfolio::QTY_EPSILON)
                .then(|| Order::market(ts, asset.clone(), delta))
        })
        .collect();

    orders.sort_by(|a, b| {
        let a_sell = a.quantity < 0.0;
        let b_sell = b.quantity < 0.0;
        match (a_sell, b_sell) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.asset.cmp(&b.asset),
        }
    });
    orders
}
