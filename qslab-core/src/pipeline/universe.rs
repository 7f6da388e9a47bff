//! Asset universes.

use crate::domain::Symbol;
use chrono::{DateTime, Utc};

/// The set of assets a strategy may trade at a point in time.
pub trait Universe: Send + Sync {
    fn assets(&self, ts: DateTime<Utc>) -> Vec<Symbol>;
}

/// Universe whose composition never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticUniverse {
    assets: Vec<Symbol>,
}

impl StaticUniverse {
    /// Assets are sorted and de-duplicated.
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut assets: Vec<Symbol> = assets.into_iter().map(Into::into).collect();
        assets.sort();
        assets.dedup();
        Self { assets }
    }
}

impl Universe for StaticUniverse {
    fn assets(&self, _ts: DateTime<Utc>) -> Vec<Symbol> {
        self.assets.clone()
    }
}
