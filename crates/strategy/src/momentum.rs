use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use optionsbot_core::{Position, PriceGateway, Signal, Strategy, TradingMode};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::factory::StrategyFactory;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub symbol: String,
    pub quantity: Decimal,
    pub fast_period: usize,
    pub slow_period: usize,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            quantity: Decimal::from(50),
            fast_period: 5,
            slow_period: 20,
            stop_loss_pct: Decimal::from(20),
            take_profit_pct: Decimal::from(40),
        }
    }
}

/// Moving-average momentum follower. Buys when the fast average crosses
/// above the slow one, exits on reversal or premium thresholds.
pub struct MomentumStrategy {
    name: String,
    params: MomentumParams,
    gateway: Arc<dyn PriceGateway>,
    fast_prices: VecDeque<Decimal>,
    slow_prices: VecDeque<Decimal>,
    was_above: Option<bool>,
}

impl MomentumStrategy {
    #[must_use]
    pub fn new(name: String, params: MomentumParams, gateway: Arc<dyn PriceGateway>) -> Self {
        Self {
            name,
            params,
            gateway,
            fast_prices: VecDeque::new(),
            slow_prices: VecDeque::new(),
            was_above: None,
        }
    }

    fn average(prices: &VecDeque<Decimal>) -> Decimal {
        let sum: Decimal = prices.iter().sum();
        sum / Decimal::from(prices.len())
    }

    fn push_price(&mut self, price: Decimal) {
        self.fast_prices.push_back(price);
        self.slow_prices.push_back(price);
        if self.fast_prices.len() > self.params.fast_period {
            self.fast_prices.pop_front();
        }
        if self.slow_prices.len() > self.params.slow_period {
            self.slow_prices.pop_front();
        }
    }

    fn warm(&self) -> bool {
        self.fast_prices.len() >= self.params.fast_period
            && self.slow_prices.len() >= self.params.slow_period
    }
}

#[async_trait]
impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate_entry(&mut self) -> Result<Vec<Signal>> {
        let symbols = vec![self.params.symbol.clone()];
        let prices = self.gateway.last_prices(&symbols).await?;
        let Some(price) = prices.get(&self.params.symbol).copied() else {
            tracing::debug!("No quote for {}; momentum window unchanged", self.params.symbol);
            return Ok(Vec::new());
        };

        self.push_price(price);
        if !self.warm() {
            return Ok(Vec::new());
        }

        let above = Self::average(&self.fast_prices) > Self::average(&self.slow_prices);
        let crossed_up = above && self.was_above == Some(false);
        self.was_above = Some(above);

        if crossed_up {
            Ok(vec![Signal {
                symbol: self.params.symbol.clone(),
                quantity: self.params.quantity,
                entry_price: price,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn evaluate_exit(&mut self, position: &Position) -> Result<bool> {
        if position.entry_price == Decimal::ZERO {
            return Ok(false);
        }
        let move_pct = (position.current_price - position.entry_price) / position.entry_price
            * Decimal::from(100);
        if move_pct <= -self.params.stop_loss_pct || move_pct >= self.params.take_profit_pct {
            return Ok(true);
        }
        // Momentum gone: fast average back under the slow one.
        Ok(self.warm() && Self::average(&self.fast_prices) < Self::average(&self.slow_prices))
    }
}

pub struct MomentumFactory {
    gateway: Arc<dyn PriceGateway>,
}

impl MomentumFactory {
    #[must_use]
    pub fn new(gateway: Arc<dyn PriceGateway>) -> Self {
        Self { gateway }
    }
}

impl StrategyFactory for MomentumFactory {
    fn class_name(&self) -> &str {
        "momentum"
    }

    fn supported_modes(&self) -> &[TradingMode] {
        &[TradingMode::Backtest, TradingMode::Paper]
    }

    fn create(
        &self,
        name: &str,
        parameters: &serde_json::Value,
    ) -> Result<Box<dyn Strategy>> {
        let params: MomentumParams = if parameters.is_null() {
            MomentumParams::default()
        } else {
            serde_json::from_value(parameters.clone()).context("invalid momentum parameters")?
        };
        anyhow::ensure!(
            params.fast_period > 0 && params.fast_period < params.slow_period,
            "fast_period must be positive and below slow_period"
        );
        Ok(Box::new(MomentumStrategy::new(
            name.to_string(),
            params,
            Arc::clone(&self.gateway),
        )))
    }
}
