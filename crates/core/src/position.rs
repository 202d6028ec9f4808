use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
    Partial,
}

/// A simulated position, created together with its originating buy order.
///
/// `entry_time` is the entry order's fill timestamp. Quantity never changes
/// after creation; a close books the full quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub strategy_name: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Position {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Updates the mark price and recomputes unrealized PnL while open.
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        if self.status == PositionStatus::Open {
            self.unrealized_pnl = (price - self.entry_price) * self.quantity;
        }
    }

    /// Notional committed at entry.
    #[must_use]
    pub fn entry_notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}
