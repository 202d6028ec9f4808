use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyInstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total simulated capital the session starts with.
    pub virtual_capital: Decimal,
    /// Seconds between trading cycles while the market is open.
    pub cycle_interval_secs: u64,
    /// Seconds to sleep when the market is closed.
    pub idle_interval_secs: u64,
    /// How long `stop()` waits for the worker before aborting it.
    pub stop_join_timeout_secs: u64,
    /// Path the end-of-cycle ledger snapshot is written to.
    pub snapshot_path: String,
    pub market_open: String,
    pub market_close: String,
    /// Exchange local-time offset from UTC, in minutes (IST is +330).
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Declarative strategy instance: registered at startup, activated per mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstanceConfig {
    pub name: String,
    pub class: String,
    pub allocated_capital: Decimal,
    #[serde(default)]
    pub mode: crate::TradingMode,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            gateway: GatewayConfig {
                base_url: "https://api.kite.trade".to_string(),
                api_key: String::new(),
                access_token: None,
            },
            database: DatabaseConfig {
                url: "sqlite://optionsbot.db".to_string(),
                max_connections: 5,
            },
            strategies: Vec::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            virtual_capital: Decimal::from(200_000),
            cycle_interval_secs: 30,
            idle_interval_secs: 60,
            stop_join_timeout_secs: 10,
            snapshot_path: "paper_trading_state.json".to_string(),
            market_open: "09:15".to_string(),
            market_close: "15:30".to_string(),
            utc_offset_minutes: 330,
        }
    }
}
