//! Top-level error for building and running a backtest session.

use crate::broker::BrokerError;
use crate::clock::ClockError;
use crate::pipeline::PipelineError;
use crate::schedule::ScheduleError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl BacktestError {
    /// Policy errors raised while building a session.
    pub fn is_missing_parameter(&self) -> bool {
        matches!(
            self,
            BacktestError::MissingParameter(_)
                | BacktestError::Schedule(ScheduleError::MissingParameter(_))
        )
    }
}
