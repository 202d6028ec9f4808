use anyhow::Result;
use async_trait::async_trait;
use optionsbot_core::{Order, PersistenceSink, Position, TradingMode};

/// Discards every record. Used when running without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record_order(&self, order: &Order, _mode: TradingMode) -> Result<()> {
        tracing::trace!("Dropping order record {}", order.order_id);
        Ok(())
    }

    async fn record_position(&self, position: &Position, _mode: TradingMode) -> Result<()> {
        tracing::trace!("Dropping position record {}", position.position_id);
        Ok(())
    }

    async fn record_event(&self, _level: &str, _component: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}
