use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use optionsbot_core::{ManagerError, PriceGateway, Strategy, StrategyStatus, TradingMode};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use crate::factory::StrategyFactory;
use crate::instance::{PerformanceRecord, RiskLimits, StrategyInstance};

/// Shared handle to a running strategy object. The engine locks it for the
/// duration of a single evaluation call.
pub type StrategyHandle = Arc<Mutex<Box<dyn Strategy>>>;

struct ManagedInstance {
    meta: StrategyInstance,
    strategy: StrategyHandle,
}

/// Registry of strategy classes and named instances.
///
/// Owns per-instance configuration, activation state, and performance
/// counters. All mutation goes through manager operations; callers only ever
/// see cloned snapshots of instance metadata.
pub struct StrategyManager {
    classes: RwLock<HashMap<String, Arc<dyn StrategyFactory>>>,
    instances: RwLock<HashMap<String, ManagedInstance>>,
    gateway: Arc<dyn PriceGateway>,
}

impl StrategyManager {
    #[must_use]
    pub fn new(gateway: Arc<dyn PriceGateway>) -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            gateway,
        }
    }

    /// Registers a strategy class under its factory's `class_name`.
    ///
    /// Re-registering an existing class name replaces the mapping; existing
    /// instances keep the strategy object they were built with.
    ///
    /// # Errors
    /// Returns `InvalidImplementation` if the factory declares no supported
    /// trading modes.
    pub async fn register_class(&self, factory: Arc<dyn StrategyFactory>) -> Result<(), ManagerError> {
        if factory.supported_modes().is_empty() {
            return Err(ManagerError::InvalidImplementation {
                name: factory.class_name().to_string(),
                reason: "declares no supported trading modes".to_string(),
            });
        }
        let name = factory.class_name().to_string();
        let previous = self.classes.write().await.insert(name.clone(), factory);
        if previous.is_some() {
            tracing::info!("Replaced strategy class registration for '{}'", name);
        } else {
            tracing::info!("Registered strategy class '{}'", name);
        }
        Ok(())
    }

    /// Creates a named instance of a registered class, wired and INACTIVE.
    ///
    /// # Errors
    /// Returns `DuplicateName`, `UnknownClass`, `InvalidCapital` for the
    /// corresponding argument problems, or `InvalidImplementation` if the
    /// factory rejects the parameter map.
    pub async fn create_instance(
        &self,
        name: &str,
        class_name: &str,
        parameters: serde_json::Value,
        mode: TradingMode,
        allocated_capital: Decimal,
        risk_limits: RiskLimits,
    ) -> Result<(), ManagerError> {
        if allocated_capital <= Decimal::ZERO {
            return Err(ManagerError::InvalidCapital(allocated_capital));
        }

        let factory = self
            .classes
            .read()
            .await
            .get(class_name)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownClass(class_name.to_string()))?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(name) {
            return Err(ManagerError::DuplicateName(name.to_string()));
        }

        let strategy =
            factory
                .create(name, &parameters)
                .map_err(|e| ManagerError::InvalidImplementation {
                    name: class_name.to_string(),
                    reason: e.to_string(),
                })?;

        let meta = StrategyInstance {
            name: name.to_string(),
            class_name: class_name.to_string(),
            parameters,
            mode,
            allocated_capital,
            risk_limits,
            status: StrategyStatus::Inactive,
            created_at: Utc::now(),
            performance: PerformanceRecord::default(),
        };
        instances.insert(
            name.to_string(),
            ManagedInstance {
                meta,
                strategy: Arc::new(Mutex::new(strategy)),
            },
        );
        tracing::info!("Created strategy instance '{}' ({}, {})", name, class_name, mode);
        Ok(())
    }

    /// Activates an instance for scheduling.
    ///
    /// Activating an already-ACTIVE instance is a no-op. An ERROR instance
    /// stays in ERROR; clearing it is outside this registry's contract.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown names, or `ModeNotReady` when a LIVE
    /// instance is activated without an authenticated gateway.
    pub async fn activate(&self, name: &str) -> Result<(), ManagerError> {
        let mut instances = self.instances.write().await;
        let managed = instances
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        match managed.meta.status {
            StrategyStatus::Active => {
                tracing::debug!("Strategy '{}' already active", name);
                Ok(())
            }
            StrategyStatus::Error => {
                tracing::warn!("Refusing to activate '{}': instance is in ERROR", name);
                Ok(())
            }
            _ => {
                if managed.meta.mode == TradingMode::Live && !self.gateway.is_authenticated() {
                    return Err(ManagerError::ModeNotReady {
                        name: name.to_string(),
                        mode: TradingMode::Live,
                        reason: "price gateway is not authenticated".to_string(),
                    });
                }
                managed.meta.status = StrategyStatus::Active;
                tracing::info!("Activated strategy '{}'", name);
                Ok(())
            }
        }
    }

    /// Deactivates an instance. ERROR instances stay in ERROR.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown names.
    pub async fn deactivate(&self, name: &str) -> Result<(), ManagerError> {
        let mut instances = self.instances.write().await;
        let managed = instances
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        if managed.meta.status == StrategyStatus::Error {
            tracing::warn!("Strategy '{}' is in ERROR; leaving status unchanged", name);
            return Ok(());
        }
        managed.meta.status = StrategyStatus::Inactive;
        tracing::info!("Deactivated strategy '{}'", name);
        Ok(())
    }

    /// Removes an instance together with its configuration and performance
    /// record.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown names.
    pub async fn remove(&self, name: &str) -> Result<(), ManagerError> {
        let removed = self.instances.write().await.remove(name);
        if removed.is_none() {
            return Err(ManagerError::NotFound(name.to_string()));
        }
        tracing::info!("Removed strategy instance '{}'", name);
        Ok(())
    }

    /// Books a closed trade's PnL against an instance's counters.
    ///
    /// Unknown names are logged and ignored; the ledger already booked the
    /// trade, so attribution failure must not fail the cycle.
    pub async fn record_trade_outcome(&self, name: &str, pnl: Decimal) {
        let mut instances = self.instances.write().await;
        let Some(managed) = instances.get_mut(name) else {
            tracing::warn!("Trade outcome for unknown strategy '{}' dropped", name);
            return;
        };
        let perf = &mut managed.meta.performance;
        perf.total_trades += 1;
        if pnl > Decimal::ZERO {
            perf.winning_trades += 1;
        } else {
            perf.losing_trades += 1;
        }
        perf.total_pnl += pnl;
        if pnl < perf.max_drawdown {
            perf.max_drawdown = pnl;
        }
        perf.last_updated = Some(Utc::now());
    }

    /// Engine-driven status transition (PAUSED, ERROR, COMPLETED).
    ///
    /// # Errors
    /// Returns `NotFound` for unknown names.
    pub async fn set_status(&self, name: &str, status: StrategyStatus) -> Result<(), ManagerError> {
        let mut instances = self.instances.write().await;
        let managed = instances
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
        tracing::info!(
            "Strategy '{}' status {} -> {}",
            name,
            managed.meta.status,
            status
        );
        managed.meta.status = status;
        Ok(())
    }

    /// Names of all ACTIVE instances for the given mode, in no particular
    /// order.
    #[must_use]
    pub async fn active_instances(&self, mode: TradingMode) -> Vec<String> {
        self.instances
            .read()
            .await
            .values()
            .filter(|m| m.meta.status == StrategyStatus::Active && m.meta.mode == mode)
            .map(|m| m.meta.name.clone())
            .collect()
    }

    /// Whether the instance's class declares support for `mode`.
    ///
    /// # Errors
    /// Returns `NotFound` if the instance does not exist.
    pub async fn validate_mode_support(
        &self,
        name: &str,
        mode: TradingMode,
    ) -> Result<bool, ManagerError> {
        let class_name = {
            let instances = self.instances.read().await;
            let managed = instances
                .get(name)
                .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;
            managed.meta.class_name.clone()
        };
        let classes = self.classes.read().await;
        Ok(classes
            .get(&class_name)
            .is_some_and(|f| f.supported_modes().contains(&mode)))
    }

    /// Shared handle to the strategy object, or `None` for unknown names.
    #[must_use]
    pub async fn strategy_handle(&self, name: &str) -> Option<StrategyHandle> {
        self.instances
            .read()
            .await
            .get(name)
            .map(|m| Arc::clone(&m.strategy))
    }

    /// Registered class names, sorted for stable listings.
    #[must_use]
    pub async fn available_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// An instance's performance counters, or `None` for unknown names.
    #[must_use]
    pub async fn performance(&self, name: &str) -> Option<PerformanceRecord> {
        self.instances
            .read()
            .await
            .get(name)
            .map(|m| m.meta.performance)
    }

    /// Snapshot of one instance's metadata.
    #[must_use]
    pub async fn instance(&self, name: &str) -> Option<StrategyInstance> {
        self.instances.read().await.get(name).map(|m| m.meta.clone())
    }

    /// Snapshots of all registered instances.
    #[must_use]
    pub async fn list_instances(&self) -> Vec<StrategyInstance> {
        self.instances
            .read()
            .await
            .values()
            .map(|m| m.meta.clone())
            .collect()
    }
}
