use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use optionsbot_core::PriceGateway;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

/// In-memory gateway serving a fixed price table.
///
/// Used for offline runs and as the test double across the workspace.
pub struct StaticGateway {
    prices: RwLock<HashMap<String, Decimal>>,
    authenticated: bool,
}

impl StaticGateway {
    #[must_use]
    pub fn new(authenticated: bool) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            authenticated,
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn remove_price(&self, symbol: &str) {
        self.prices.write().await.remove(symbol);
    }
}

impl Default for StaticGateway {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl PriceGateway for StaticGateway {
    async fn last_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        let prices = self.prices.read().await;
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn serves_only_known_symbols() {
        let gateway = StaticGateway::new(false);
        gateway.set_price("NIFTY", dec!(24500)).await;

        let symbols = vec!["NIFTY".to_string(), "BANKNIFTY".to_string()];
        let prices = gateway.last_prices(&symbols).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["NIFTY"], dec!(24500));
    }

    #[tokio::test]
    async fn removing_a_price_makes_it_absent() {
        let gateway = StaticGateway::new(false);
        gateway.set_price("NIFTY", dec!(24500)).await;
        gateway.remove_price("NIFTY").await;

        let symbols = vec!["NIFTY".to_string()];
        assert!(gateway.last_prices(&symbols).await.unwrap().is_empty());
    }
}
