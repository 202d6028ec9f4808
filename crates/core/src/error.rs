use rust_decimal::Decimal;
use thiserror::Error;

use crate::TradingMode;

/// Failures surfaced by the strategy manager's registry operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("strategy instance '{0}' is already registered")]
    DuplicateName(String),

    #[error("unknown strategy class '{0}'")]
    UnknownClass(String),

    #[error("strategy class '{name}' is not a valid implementation: {reason}")]
    InvalidImplementation { name: String, reason: String },

    #[error("allocated capital must be positive, got {0}")]
    InvalidCapital(Decimal),

    #[error("no strategy instance named '{0}'")]
    NotFound(String),

    #[error("instance '{name}' cannot activate in {mode} mode: {reason}")]
    ModeNotReady {
        name: String,
        mode: TradingMode,
        reason: String,
    },
}

/// Failures surfaced by the paper trading engine's lifecycle calls.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,
}
