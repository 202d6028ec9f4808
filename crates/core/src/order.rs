use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Executed,
    Failed,
    Cancelled,
}

/// A simulated order in the session ledger.
///
/// Immutable once `Executed` apart from `execution_price` / `executed_at`,
/// which are set atomically at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub strategy_name: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Price requested by the signal, not necessarily the fill price.
    pub price: Decimal,
    pub kind: OrderKind,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub execution_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
}
