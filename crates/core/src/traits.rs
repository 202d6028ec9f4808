use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::{Order, Position, Signal, TradingMode};

/// Quote source abstraction.
///
/// The paper engine only reads last-traded prices; live trading additionally
/// requires an authenticated session.
#[async_trait]
pub trait PriceGateway: Send + Sync {
    /// Fetches last-traded prices for a batch of symbols. Symbols the venue
    /// does not know are simply absent from the returned map.
    ///
    /// # Errors
    /// Returns an error if the quote request itself fails (transport, auth).
    async fn last_prices(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, Decimal>>;

    /// Single-symbol convenience over [`last_prices`](Self::last_prices).
    ///
    /// # Errors
    /// Returns an error if the quote request itself fails.
    async fn last_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        let symbols = [symbol.to_string()];
        let mut prices = self.last_prices(&symbols).await?;
        Ok(prices.remove(symbol))
    }

    /// Whether the gateway holds a valid authenticated session.
    fn is_authenticated(&self) -> bool;
}

/// A runnable strategy instance.
///
/// One object per registered instance; the engine drives `evaluate_entry` /
/// `evaluate_exit` each cycle for every active instance.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Instance name the strategy was registered under.
    fn name(&self) -> &str;

    /// Produces entry signals for the current cycle. An empty vec means no
    /// entry this cycle.
    ///
    /// # Errors
    /// Returns an error if the strategy cannot evaluate (e.g. quote failure).
    async fn evaluate_entry(&mut self) -> anyhow::Result<Vec<Signal>>;

    /// Decides whether an open position should be closed this cycle.
    ///
    /// # Errors
    /// Returns an error if the strategy cannot evaluate the position.
    async fn evaluate_exit(&mut self, position: &Position) -> anyhow::Result<bool>;
}

/// Durable record sink for orders, position lifecycle and engine events.
///
/// Persistence failures are reported but never abort a trading cycle; the
/// in-memory ledger stays authoritative.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// # Errors
    /// Returns an error if the record could not be written.
    async fn record_order(&self, order: &Order, mode: TradingMode) -> anyhow::Result<()>;

    /// # Errors
    /// Returns an error if the record could not be written.
    async fn record_position(&self, position: &Position, mode: TradingMode) -> anyhow::Result<()>;

    /// # Errors
    /// Returns an error if the event could not be written.
    async fn record_event(&self, level: &str, component: &str, message: &str)
        -> anyhow::Result<()>;
}
