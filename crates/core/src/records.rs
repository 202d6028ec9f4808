use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time engine status summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub is_running: bool,
    pub market_open: bool,
    pub virtual_capital: Decimal,
    pub available_capital: Decimal,
    /// Capital locked in open positions, valued at entry.
    pub used_capital: Decimal,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Percentage in [0, 100]; zero when no trades have closed yet.
    pub win_rate: Decimal,
    pub active_positions: usize,
    pub pending_orders: usize,
    pub last_updated: DateTime<Utc>,
}

/// Counter snapshot overwritten on disk each cycle.
///
/// Operational inspection only; the in-memory ledger is never rebuilt from
/// this file on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub virtual_capital: Decimal,
    pub available_capital: Decimal,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub order_counter: u64,
    pub position_counter: u64,
    pub last_saved: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = StateSnapshot {
            virtual_capital: dec!(1000000),
            available_capital: dec!(925000),
            total_pnl: dec!(-1250.50),
            daily_pnl: dec!(300),
            winning_trades: 4,
            losing_trades: 3,
            order_counter: 14,
            position_counter: 7,
            last_saved: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.available_capital, dec!(925000));
        assert_eq!(back.order_counter, 14);
        assert_eq!(back.losing_trades, 3);
    }
}
