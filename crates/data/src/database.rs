use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use optionsbot_core::{Order, PersistenceSink, Position, TradingMode};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// `SQLite` store for trade, position, and event history.
///
/// Append-mostly: orders are inserted once, positions are upserted so the
/// exit pass overwrites the entry row, events only accumulate.
#[derive(Clone)]
pub struct TradeDatabase {
    pool: SqlitePool,
}

impl TradeDatabase {
    /// Creates a new database connection pool and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails or migrations fail.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 5).await
    }

    /// # Errors
    /// Returns error if the count query fails.
    pub async fn trade_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// # Errors
    /// Returns error if the count query fails.
    pub async fn event_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM system_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// # Errors
    /// Returns error if the query fails.
    pub async fn position_status(&self, position_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM positions WHERE position_id = ?1")
                .bind(position_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(status,)| status))
    }
}

#[async_trait]
impl PersistenceSink for TradeDatabase {
    async fn record_order(&self, order: &Order, mode: TradingMode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO trades
                (order_id, strategy_name, symbol, side, quantity, price, status, mode,
                 executed_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                executed_at = excluded.executed_at
            ",
        )
        .bind(&order.order_id)
        .bind(&order.strategy_name)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.quantity.to_string())
        .bind(order.execution_price.unwrap_or(order.price).to_string())
        .bind(format!("{:?}", order.status).to_uppercase())
        .bind(mode.to_string())
        .bind(order.executed_at.map(|t| t.to_rfc3339()))
        .bind(order.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_position(&self, position: &Position, mode: TradingMode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO positions
                (position_id, strategy_name, symbol, quantity, entry_price, exit_price,
                 status, mode, realized_pnl, entry_time, exit_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(position_id) DO UPDATE SET
                exit_price = excluded.exit_price,
                status = excluded.status,
                realized_pnl = excluded.realized_pnl,
                exit_time = excluded.exit_time
            ",
        )
        .bind(&position.position_id)
        .bind(&position.strategy_name)
        .bind(&position.symbol)
        .bind(position.quantity.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.exit_price.map(|p| p.to_string()))
        .bind(format!("{:?}", position.status).to_uppercase())
        .bind(mode.to_string())
        .bind(position.realized_pnl.to_string())
        .bind(position.entry_time.to_rfc3339())
        .bind(position.exit_time.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_event(&self, level: &str, component: &str, message: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO system_events (level, component, message, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(level)
        .bind(component)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
