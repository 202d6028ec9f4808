use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use optionsbot_core::{GatewayConfig, PriceGateway};
use reqwest::Client;
use rust_decimal::Decimal;

type DirectLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP last-price client for the broker's quote API.
///
/// Unauthenticated construction is allowed; paper trading only needs quotes,
/// while LIVE activation checks `is_authenticated`.
pub struct QuoteClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    rate_limiter: Arc<DirectLimiter>,
}

impl QuoteClient {
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        // Broker quote endpoints allow roughly one call per second per key.
        let quota = Quota::per_second(NonZeroU32::MIN);
        Self {
            http_client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn auth_header(&self) -> String {
        match &self.access_token {
            Some(token) => format!("token {}:{}", self.api_key, token),
            None => format!("token {}:", self.api_key),
        }
    }
}

#[async_trait]
impl PriceGateway for QuoteClient {
    async fn last_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        self.rate_limiter.until_ready().await;

        let url = format!("{}/quote/ltp", self.base_url);
        let query: Vec<(&str, &str)> = symbols.iter().map(|s| ("i", s.as_str())).collect();
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(&query)
            .send()
            .await
            .context("quote request failed")?
            .error_for_status()
            .context("quote request rejected")?;

        let body: serde_json::Value = response.json().await.context("malformed quote body")?;
        let mut prices = HashMap::new();
        if let Some(data) = body.get("data").and_then(|d| d.as_object()) {
            for (symbol, quote) in data {
                let Some(last_price) = quote.get("last_price").and_then(|p| p.as_f64()) else {
                    continue;
                };
                if let Some(price) = Decimal::from_f64_retain(last_price) {
                    prices.insert(symbol.clone(), price);
                }
            }
        }
        tracing::debug!("Quoted {} of {} symbols", prices.len(), symbols.len());
        Ok(prices)
    }

    fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            base_url: "https://api.kite.trade".to_string(),
            api_key: "key".to_string(),
            access_token: token.map(String::from),
        }
    }

    #[test]
    fn authentication_tracks_the_access_token() {
        assert!(!QuoteClient::new(&config(None)).is_authenticated());
        assert!(QuoteClient::new(&config(Some("tok"))).is_authenticated());
    }

    #[test]
    fn auth_header_includes_key_and_token() {
        let client = QuoteClient::new(&config(Some("tok")));
        assert_eq!(client.auth_header(), "token key:tok");
    }

    #[tokio::test]
    async fn empty_symbol_batch_short_circuits() {
        let client = QuoteClient::new(&config(None));
        let prices = client.last_prices(&[]).await.unwrap();
        assert!(prices.is_empty());
    }
}
