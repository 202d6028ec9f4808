use serde::{Deserialize, Serialize};

/// Execution context a strategy instance runs under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TradingMode {
    Backtest,
    #[default]
    Paper,
    /// Live trading with real money (requires an authenticated gateway).
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backtest => write!(f, "BACKTEST"),
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Lifecycle status of a strategy instance.
///
/// `Inactive -> Active` via an explicit activation call; `Error` is terminal
/// for scheduling (the engine never picks up `Error` instances) and this core
/// defines no reset for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyStatus {
    Inactive,
    Active,
    Paused,
    Error,
    Completed,
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Error => write!(f, "ERROR"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}
