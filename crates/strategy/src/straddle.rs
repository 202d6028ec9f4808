use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use optionsbot_core::{Position, PriceGateway, Signal, Strategy, TradingMode};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::factory::StrategyFactory;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StraddleParams {
    pub index_symbol: String,
    pub quantity: Decimal,
    pub strike_step: Decimal,
    /// Exit when a leg loses this percentage of its entry premium.
    pub stop_loss_pct: Decimal,
    /// Exit when a leg gains this percentage of its entry premium.
    pub take_profit_pct: Decimal,
}

impl Default for StraddleParams {
    fn default() -> Self {
        Self {
            index_symbol: "NIFTY".to_string(),
            quantity: Decimal::from(50),
            strike_step: Decimal::from(50),
            stop_loss_pct: Decimal::from(30),
            take_profit_pct: Decimal::from(50),
        }
    }
}

/// Buys the at-the-money call and put of an index once per session, then
/// manages each leg independently on premium percentage moves.
pub struct StraddleStrategy {
    name: String,
    params: StraddleParams,
    gateway: Arc<dyn PriceGateway>,
    entered: bool,
}

impl StraddleStrategy {
    #[must_use]
    pub fn new(name: String, params: StraddleParams, gateway: Arc<dyn PriceGateway>) -> Self {
        Self {
            name,
            params,
            gateway,
            entered: false,
        }
    }

    fn atm_strike(&self, spot: Decimal) -> Decimal {
        (spot / self.params.strike_step).round() * self.params.strike_step
    }

    fn leg_symbols(&self, strike: Decimal) -> (String, String) {
        let strike = strike.normalize();
        (
            format!("{}{}CE", self.params.index_symbol, strike),
            format!("{}{}PE", self.params.index_symbol, strike),
        )
    }
}

#[async_trait]
impl Strategy for StraddleStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate_entry(&mut self) -> Result<Vec<Signal>> {
        if self.entered {
            return Ok(Vec::new());
        }

        let index = vec![self.params.index_symbol.clone()];
        let spot_map = self.gateway.last_prices(&index).await?;
        let Some(spot) = spot_map.get(&self.params.index_symbol).copied() else {
            tracing::debug!("No spot price for {}; entry deferred", self.params.index_symbol);
            return Ok(Vec::new());
        };

        let (ce, pe) = self.leg_symbols(self.atm_strike(spot));
        let legs = vec![ce.clone(), pe.clone()];
        let premiums = self.gateway.last_prices(&legs).await?;

        let mut signals = Vec::new();
        for symbol in [ce, pe] {
            if let Some(premium) = premiums.get(&symbol).copied() {
                signals.push(Signal {
                    symbol,
                    quantity: self.params.quantity,
                    entry_price: premium,
                });
            } else {
                tracing::debug!("No premium quote for {}; leg skipped", symbol);
            }
        }

        if !signals.is_empty() {
            self.entered = true;
        }
        Ok(signals)
    }

    async fn evaluate_exit(&mut self, position: &Position) -> Result<bool> {
        if position.entry_price == Decimal::ZERO {
            return Ok(false);
        }
        // Marks come from the engine's previous refresh pass.
        let move_pct = (position.current_price - position.entry_price) / position.entry_price
            * Decimal::from(100);
        Ok(move_pct <= -self.params.stop_loss_pct || move_pct >= self.params.take_profit_pct)
    }
}

pub struct StraddleFactory {
    gateway: Arc<dyn PriceGateway>,
}

impl StraddleFactory {
    #[must_use]
    pub fn new(gateway: Arc<dyn PriceGateway>) -> Self {
        Self { gateway }
    }
}

impl StrategyFactory for StraddleFactory {
    fn class_name(&self) -> &str {
        "straddle"
    }

    fn supported_modes(&self) -> &[TradingMode] {
        &[TradingMode::Backtest, TradingMode::Paper, TradingMode::Live]
    }

    fn create(
        &self,
        name: &str,
        parameters: &serde_json::Value,
    ) -> Result<Box<dyn Strategy>> {
        let params = if parameters.is_null() {
            StraddleParams::default()
        } else {
            serde_json::from_value(parameters.clone()).context("invalid straddle parameters")?
        };
        Ok(Box::new(StraddleStrategy::new(
            name.to_string(),
            params,
            Arc::clone(&self.gateway),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use optionsbot_core::PositionStatus;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MapGateway {
        prices: Mutex<HashMap<String, Decimal>>,
    }

    impl MapGateway {
        fn new(prices: &[(&str, Decimal)]) -> Arc<Self> {
            Arc::new(Self {
                prices: Mutex::new(
                    prices
                        .iter()
                        .map(|(s, p)| ((*s).to_string(), *p))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl PriceGateway for MapGateway {
        async fn last_prices(
            &self,
            symbols: &[String],
        ) -> Result<HashMap<String, Decimal>> {
            let prices = self.prices.lock().await;
            Ok(symbols
                .iter()
                .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
                .collect())
        }

        fn is_authenticated(&self) -> bool {
            false
        }
    }

    fn position(entry: Decimal, current: Decimal) -> Position {
        Position {
            position_id: "POS_000001".to_string(),
            strategy_name: "straddle".to_string(),
            symbol: "NIFTY24500CE".to_string(),
            quantity: dec!(50),
            entry_price: entry,
            current_price: current,
            entry_time: Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn enters_both_legs_at_the_atm_strike() {
        let gateway = MapGateway::new(&[
            ("NIFTY", dec!(24480)),
            ("NIFTY24500CE", dec!(120.50)),
            ("NIFTY24500PE", dec!(110.25)),
        ]);
        let mut strategy =
            StraddleStrategy::new("s".to_string(), StraddleParams::default(), gateway);

        let signals = strategy.evaluate_entry().await.unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].symbol, "NIFTY24500CE");
        assert_eq!(signals[0].entry_price, dec!(120.50));
        assert_eq!(signals[1].symbol, "NIFTY24500PE");

        // One shot per session.
        assert!(strategy.evaluate_entry().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_spot_defers_entry() {
        let gateway = MapGateway::new(&[]);
        let mut strategy =
            StraddleStrategy::new("s".to_string(), StraddleParams::default(), gateway);
        assert!(strategy.evaluate_entry().await.unwrap().is_empty());
        // A later cycle may still enter.
        assert!(!strategy.entered);
    }

    #[tokio::test]
    async fn exits_on_stop_loss_and_take_profit() {
        let gateway = MapGateway::new(&[]);
        let mut strategy =
            StraddleStrategy::new("s".to_string(), StraddleParams::default(), gateway);

        // -30% hits the stop.
        assert!(strategy
            .evaluate_exit(&position(dec!(100), dec!(70)))
            .await
            .unwrap());
        // +50% hits the target.
        assert!(strategy
            .evaluate_exit(&position(dec!(100), dec!(150)))
            .await
            .unwrap());
        // Small moves hold.
        assert!(!strategy
            .evaluate_exit(&position(dec!(100), dec!(95)))
            .await
            .unwrap());
    }
}
