//! Orders as produced by the strategy pipeline and consumed by the broker.

use super::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Fill at the prevailing ask (buy) or bid (sell).
    Market,
    /// Fill at exactly `limit_price` once the quote crosses it.
    Limit { limit_price: f64 },
}

/// Direction derived from the sign of the order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// An order request. Positive quantity buys, negative quantity sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub timestamp: DateTime<Utc>,
    pub asset: Symbol,
    pub quantity: f64,
    pub order_type: OrderType,
}

impl Order {
    pub fn market(timestamp: DateTime<Utc>, asset: impl Into<Symbol>, quantity: f64) -> Self {
        Self {
            timestamp,
            asset: asset.into(),
            quantity,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(
        timestamp: DateTime<Utc>,
        asset: impl Into<Symbol>,
        quantity: f64,
        limit_price: f64,
    ) -> Self {
        Self {
            timestamp,
            asset: asset.into(),
            quantity,
            order_type: OrderType::Limit { limit_price },
        }
    }

    pub fn side(&self) -> OrderSide {
        if self.quantity > 0.0 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(limit_price),
        }
    }

    /// Check the order is executable in principle.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.asset.is_empty() {
            return Err("asset id is empty".into());
        }
        if !self.quantity.is_finite() || self.quantity == 0.0 {
            return Err(format!("quantity must be non-zero, got {}", self.quantity));
        }
        if let OrderType::Limit { limit_price } = self.order_type {
            if !limit_price.is_finite() || limit_price <= 0.0 {
                return Err(format!("limit price must be positive, got {limit_price}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, 15, 0, 0).unwrap()
    }

    #[test]
    fn side_follows_quantity_sign() {
        assert_eq!(Order::market(ts(), "EQ:ABC", 10.0).side(), OrderSide::Buy);
        assert_eq!(Order::market(ts(), "EQ:ABC", -10.0).side(), OrderSide::Sell);
    }

    #[test]
    fn zero_quantity_is_invalid() {
        assert!(Order::market(ts(), "EQ:ABC", 0.0).validate().is_err());
        assert!(Order::market(ts(), "EQ:ABC", f64::NAN).validate().is_err());
    }

    #[test]
    fn limit_needs_positive_price() {
        assert!(Order::limit(ts(), "EQ:ABC", 10.0, 0.0).validate().is_err());
        assert!(Order::limit(ts(), "EQ:ABC", 10.0, -1.0).validate().is_err());
        assert!(Order::limit(ts(), "EQ:ABC", 10.0, 101.5).validate().is_ok());
        assert_eq!(Order::limit(ts(), "EQ:ABC", 10.0, 101.5).limit_price(), Some(101.5));
    }

    #[test]
    fn order_serialization_roundtrip() {
        let order = Order::limit(ts(), "EQ:ABC", -25.0, 99.0);
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"LIMIT\""));
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
