use super::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fill before commission has been assessed. Handed to the fee model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub timestamp: DateTime<Utc>,
    pub asset: Symbol,
    pub quantity: f64,
    pub price: f64,
}

impl TransactionDraft {
    /// Absolute traded notional.
    pub fn notional(&self) -> f64 {
        (self.quantity * self.price).abs()
    }

    pub fn with_commission(self, commission: f64) -> Transaction {
        Transaction {
            timestamp: self.timestamp,
            asset: self.asset,
            quantity: self.quantity,
            price: self.price,
            commission,
        }
    }
}

/// An executed fill. One per executed order, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: DateTime<Utc>,
    pub asset: Symbol,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

impl Transaction {
    /// Signed cash movement: buys are negative, sells positive, commission always negative.
    pub fn cash_delta(&self) -> f64 {
        -(self.quantity * self.price) - self.commission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cash_delta_signs() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 2, 15, 0, 0).unwrap();
        let buy = Transaction {
            timestamp: ts,
            asset: "EQ:ABC".into(),
            quantity: 100.0,
            price: 101.5,
            commission: 1.0,
        };
        assert_eq!(buy.cash_delta(), -10_151.0);

        let sell = Transaction {
            quantity: -100.0,
            ..buy
        };
        assert_eq!(sell.cash_delta(), 10_149.0);
    }
}
