//! Domain types for qslab

pub mod event;
pub mod ids;
pub mod order;
pub mod transaction;

pub use event::{EventType, SimulationEvent};
pub use ids::{IdGen, OrderId, PortfolioId};
pub use order::{Order, OrderSide, OrderType};
pub use transaction::{Transaction, TransactionDraft};

/// Asset identifier, e.g. `EQ:SPY`.
pub type Symbol = String;
