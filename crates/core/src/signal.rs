use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Entry intent produced by a strategy cycle.
///
/// `entry_price` is the reference price used for the capital check; the fill
/// price comes from the gateway at execution time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

impl Signal {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}
