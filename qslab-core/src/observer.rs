//! Session observers — injected hooks for progress output.
//!
//! The orchestrator reports what happens through a [`SessionObserver`]
//! instead of printing. The default [`TracingObserver`] forwards to `tracing`.

use crate::domain::{SimulationEvent, Transaction};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub trait SessionObserver: Send {
    fn on_start(&mut self, _start: DateTime<Utc>, _end: DateTime<Utc>) {}

    fn on_event(&mut self, _event: &SimulationEvent) {}

    fn on_fills(&mut self, _ts: DateTime<Utc>, _fills: &[Transaction]) {}

    fn on_rebalance(&mut self, _ts: DateTime<Utc>, _orders: usize) {}

    fn on_finish(&mut self, _events: usize, _final_equity: f64) {}
}

/// Forwards session progress to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_start(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        info!(%start, %end, "beginning backtest simulation");
    }

    fn on_event(&mut self, event: &SimulationEvent) {
        debug!("{event}");
    }

    fn on_fills(&mut self, ts: DateTime<Utc>, fills: &[Transaction]) {
        for fill in fills {
            debug!(
                %ts,
                asset = %fill.asset,
                quantity = fill.quantity,
                price = fill.price,
                commission = fill.commission,
                "fill"
            );
        }
    }

    fn on_rebalance(&mut self, ts: DateTime<Utc>, orders: usize) {
        info!(%ts, orders, "trading logic and rebalance");
    }

    fn on_finish(&mut self, events: usize, final_equity: f64) {
        info!(events, final_equity, "ending backtest simulation");
    }
}

/// Silent observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// What a [`RecordingObserver`] saw, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub events: Vec<SimulationEvent>,
    pub rebalances: Vec<DateTime<Utc>>,
    pub fills: Vec<Transaction>,
    pub finished: bool,
}

/// Records everything into a shared [`Recording`], for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that stays readable after the observer moves into a session.
    pub fn handle(&self) -> Arc<Mutex<Recording>> {
        Arc::clone(&self.recording)
    }

    fn with<F: FnOnce(&mut Recording)>(&self, f: F) {
        let mut guard = match self.recording.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&mut self, event: &SimulationEvent) {
        self.with(|r| r.events.push(*event));
    }

    fn on_fills(&mut self, _ts: DateTime<Utc>, fills: &[Transaction]) {
        self.with(|r| r.fills.extend_from_slice(fills));
    }

    fn on_rebalance(&mut self, ts: DateTime<Utc>, _orders: usize) {
        self.with(|r| r.rebalances.push(ts));
    }

    fn on_finish(&mut self, _events: usize, _final_equity: f64) {
        self.with(|r| r.finished = true);
    }
}
