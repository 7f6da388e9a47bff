//! Per-asset position with weighted-average cost basis.

use crate::domain::Symbol;
use serde::{Deserialize, Serialize};

/// Quantities at or below this magnitude are treated as flat.
pub const QTY_EPSILON: f64 = 1e-10;

/// Position tracking for one asset inside one portfolio.
///
/// `quantity` is signed (negative is short). `avg_price` is the average cost
/// of the currently held quantity and is zero while flat. `book_cost` and the
/// P&L figures are derived, so `book_cost == quantity * avg_price` and
/// `total_pnl == realized_pnl + unrealized_pnl` hold by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset: Symbol,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn new(asset: impl Into<Symbol>) -> Self {
        Self {
            asset: asset.into(),
            quantity: 0.0,
            avg_price: 0.0,
            current_price: 0.0,
            realized_pnl: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > QTY_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.quantity < -QTY_EPSILON
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= QTY_EPSILON
    }

    pub fn book_cost(&self) -> f64 {
        self.quantity * self.avg_price
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity * (self.current_price - self.avg_price)
    }

    pub fn total_pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized_pnl()
    }

    /// Revalue at `price` without touching quantity or cost basis.
    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
    }

    /// Apply a signed fill and return the P&L it realized.
    ///
    /// - Opening or adding: average cost is re-weighted.
    /// - Reducing or closing: P&L is realized on the closed quantity and the
    ///   average cost of the remainder is unchanged.
    /// - Flipping direction: P&L is realized on the whole old quantity and the
    ///   new quantity carries the fill price as its cost.
    pub fn apply_fill(&mut self, quantity: f64, price: f64) -> f64 {
        let old_qty = self.quantity;
        let new_qty = old_qty + quantity;
        let mut realized = 0.0;

        if self.is_flat() || old_qty.signum() == quantity.signum() {
            // Open or add
            self.avg_price = (old_qty * self.avg_price + quantity * price) / new_qty;
        } else if quantity.abs() <= old_qty.abs() + QTY_EPSILON {
            // Reduce or close
            let closed = -quantity;
            realized = closed * (price - self.avg_price);
        } else {
            // Flip
            realized = old_qty * (price - self.avg_price);
            self.avg_price = price;
        }

        self.quantity = new_qty;
        if self.is_flat() {
            self.quantity = 0.0;
            self.avg_price = 0.0;
        }
        self.realized_pnl += realized;
        self.current_price = price;
        realized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn open_long_sets_cost_basis() {
        let mut pos = Position::new("EQ:SPY");
        let realized = pos.apply_fill(50.0, 100.0);
        assert_eq!(realized, 0.0);
        assert_eq!(pos.quantity, 50.0);
        assert_eq!(pos.avg_price, 100.0);
        assert_eq!(pos.book_cost(), 5_000.0);
        assert!(pos.is_long());
    }

    #[test]
    fn adding_reweights_average() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(100.0, 100.0);
        pos.apply_fill(100.0, 110.0);
        assert_eq!(pos.quantity, 200.0);
        assert_close(pos.avg_price, 105.0);
        assert_close(pos.book_cost(), 21_000.0);
    }

    #[test]
    fn partial_sell_keeps_average_and_realizes() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(100.0, 100.0);
        let realized = pos.apply_fill(-30.0, 110.0);
        assert_close(realized, 300.0);
        assert_eq!(pos.quantity, 70.0);
        assert_eq!(pos.avg_price, 100.0);
        assert_close(pos.realized_pnl, 300.0);
    }

    #[test]
    fn full_close_goes_flat() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(50.0, 100.0);
        pos.apply_fill(-50.0, 90.0);
        assert!(pos.is_flat());
        assert_eq!(pos.avg_price, 0.0);
        assert_close(pos.realized_pnl, -500.0);
        assert_eq!(pos.market_value(), 0.0);
    }

    #[test]
    fn covering_short_realizes_gain() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(-100.0, 100.0);
        assert!(pos.is_short());
        let realized = pos.apply_fill(30.0, 90.0);
        assert_close(realized, 300.0);
        assert_eq!(pos.quantity, -70.0);
        assert_eq!(pos.avg_price, 100.0);
    }

    #[test]
    fn flip_resets_cost_basis() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(100.0, 100.0);
        let realized = pos.apply_fill(-150.0, 110.0);
        assert_close(realized, 1_000.0);
        assert_eq!(pos.quantity, -50.0);
        assert_eq!(pos.avg_price, 110.0);
        assert_close(pos.book_cost(), -5_500.0);
    }

    #[test]
    fn mark_changes_unrealized_only() {
        let mut pos = Position::new("EQ:SPY");
        pos.apply_fill(10.0, 100.0);
        pos.mark(120.0);
        assert_eq!(pos.market_value(), 1_200.0);
        assert_eq!(pos.unrealized_pnl(), 200.0);
        assert_eq!(pos.quantity, 10.0);
        assert_eq!(pos.total_pnl(), pos.realized_pnl + pos.unrealized_pnl());
    }
}
