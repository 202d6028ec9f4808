use chrono::{DateTime, Utc};
use optionsbot_core::{StrategyStatus, TradingMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-instance guard rails. The manager stores them; enforcement sits with
/// the strategy implementation and the surrounding system.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskLimits {
    pub max_loss_per_trade: Option<Decimal>,
    pub max_daily_loss: Option<Decimal>,
    pub max_open_positions: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerformanceRecord {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: Decimal,
    /// Worst single-trade PnL booked so far; zero until a losing trade lands.
    pub max_drawdown: Decimal,
    /// Stamp of the most recent booked outcome; `None` until one lands.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Registry entry for one named strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstance {
    pub name: String,
    pub class_name: String,
    pub parameters: serde_json::Value,
    pub mode: TradingMode,
    pub allocated_capital: Decimal,
    pub risk_limits: RiskLimits,
    pub status: StrategyStatus,
    pub created_at: DateTime<Utc>,
    pub performance: PerformanceRecord,
}
