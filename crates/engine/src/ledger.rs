use std::collections::HashMap;

use chrono::Utc;
use optionsbot_core::{
    EngineStatus, Order, OrderKind, OrderSide, OrderStatus, Position, PositionStatus, Signal,
    StateSnapshot,
};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient capital: required {required}, available {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },

    #[error("position '{0}' does not exist or is not open")]
    PositionNotOpen(String),
}

/// Records created atomically by a booked entry.
#[derive(Debug, Clone)]
pub struct EntryBooking {
    pub order: Order,
    pub position: Position,
}

/// Records produced by a booked exit.
#[derive(Debug, Clone)]
pub struct ExitBooking {
    pub order: Order,
    pub position: Position,
    pub realized_pnl: Decimal,
}

/// In-memory authoritative collection of orders, positions, and capital for
/// one running session.
///
/// Mutated only from the engine's worker; everything handed out is a clone.
/// After every mutating call,
/// `available_capital + Σ(open.entry_price × quantity) == virtual_capital + total_pnl`.
pub struct Ledger {
    virtual_capital: Decimal,
    available_capital: Decimal,
    total_pnl: Decimal,
    /// Session-scoped; never reset intra-session.
    daily_pnl: Decimal,
    winning_trades: u64,
    losing_trades: u64,
    order_counter: u64,
    position_counter: u64,
    orders: HashMap<String, Order>,
    positions: HashMap<String, Position>,
}

impl Ledger {
    #[must_use]
    pub fn new(virtual_capital: Decimal) -> Self {
        Self {
            virtual_capital,
            available_capital: virtual_capital,
            total_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            winning_trades: 0,
            losing_trades: 0,
            order_counter: 0,
            position_counter: 0,
            orders: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    fn next_order_id(&mut self) -> String {
        self.order_counter += 1;
        format!("PAPER_{:06}", self.order_counter)
    }

    fn next_position_id(&mut self) -> String {
        self.position_counter += 1;
        format!("POS_{:06}", self.position_counter)
    }

    /// Books an entry: one EXECUTED buy order plus one OPEN position, bound
    /// together in a single call so the identifiers can never drift apart.
    ///
    /// The capital check uses the signal's requested price; the capital
    /// decrement uses the actual fill price.
    ///
    /// # Errors
    /// Returns `InsufficientCapital` without mutating anything.
    pub fn open_entry(
        &mut self,
        strategy_name: &str,
        signal: &Signal,
        fill_price: Decimal,
    ) -> Result<EntryBooking, LedgerError> {
        let required = signal.notional();
        if required > self.available_capital {
            return Err(LedgerError::InsufficientCapital {
                required,
                available: self.available_capital,
            });
        }

        let now = Utc::now();
        let order_id = self.next_order_id();
        let position_id = self.next_position_id();

        let order = Order {
            order_id: order_id.clone(),
            strategy_name: strategy_name.to_string(),
            symbol: signal.symbol.clone(),
            side: OrderSide::Buy,
            quantity: signal.quantity,
            price: signal.entry_price,
            kind: OrderKind::Market,
            created_at: now,
            status: OrderStatus::Executed,
            execution_price: Some(fill_price),
            executed_at: Some(now),
        };

        // Entry time is the order's fill timestamp, stamped once.
        let position = Position {
            position_id: position_id.clone(),
            strategy_name: strategy_name.to_string(),
            symbol: signal.symbol.clone(),
            quantity: signal.quantity,
            entry_price: fill_price,
            current_price: fill_price,
            entry_time: now,
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        };

        self.available_capital -= fill_price * signal.quantity;
        self.orders.insert(order_id, order.clone());
        self.positions.insert(position_id, position.clone());

        debug_assert!(self.capital_balances());
        Ok(EntryBooking { order, position })
    }

    /// Books a full exit of an open position at `exit_price`.
    ///
    /// # Errors
    /// Returns `PositionNotOpen` if the position is unknown or already
    /// closed; a position is never exited twice.
    pub fn close_exit(
        &mut self,
        position_id: &str,
        exit_price: Decimal,
    ) -> Result<ExitBooking, LedgerError> {
        let is_open = self
            .positions
            .get(position_id)
            .is_some_and(|p| p.status == PositionStatus::Open);
        if !is_open {
            return Err(LedgerError::PositionNotOpen(position_id.to_string()));
        }
        let order_id = self.next_order_id();
        let position = self
            .positions
            .get_mut(position_id)
            .ok_or_else(|| LedgerError::PositionNotOpen(position_id.to_string()))?;

        let now = Utc::now();
        let realized = (exit_price - position.entry_price) * position.quantity;

        let order = Order {
            order_id: order_id.clone(),
            strategy_name: position.strategy_name.clone(),
            symbol: position.symbol.clone(),
            side: OrderSide::Sell,
            quantity: position.quantity,
            price: exit_price,
            kind: OrderKind::Market,
            created_at: now,
            status: OrderStatus::Executed,
            execution_price: Some(exit_price),
            executed_at: Some(now),
        };

        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.exit_time = Some(now);
        position.current_price = exit_price;
        position.realized_pnl = realized;
        position.unrealized_pnl = Decimal::ZERO;

        self.available_capital += exit_price * position.quantity;
        self.total_pnl += realized;
        self.daily_pnl += realized;
        if realized > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }

        let position = position.clone();
        self.orders.insert(order_id, order.clone());

        debug_assert!(self.capital_balances());
        Ok(ExitBooking {
            order,
            position,
            realized_pnl: realized,
        })
    }

    /// Applies a batch of marks. Symbols missing from `prices` keep their
    /// previous values.
    pub fn mark_positions(&mut self, prices: &HashMap<String, Decimal>) {
        for position in self.positions.values_mut() {
            if position.status != PositionStatus::Open {
                continue;
            }
            if let Some(price) = prices.get(&position.symbol) {
                position.mark(*price);
            }
        }
    }

    /// Unique symbols across all open positions.
    #[must_use]
    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    #[must_use]
    pub fn open_positions_for(&self, strategy_name: &str) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.is_open() && p.strategy_name == strategy_name)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn position(&self, position_id: &str) -> Option<Position> {
        self.positions.get(position_id).cloned()
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    #[must_use]
    pub fn available_capital(&self) -> Decimal {
        self.available_capital
    }

    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    /// Capital locked in open positions, valued at entry.
    #[must_use]
    pub fn used_capital(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .map(Position::entry_notional)
            .sum()
    }

    #[must_use]
    pub fn status(&self, is_running: bool, market_open: bool) -> EngineStatus {
        let total_trades = self.winning_trades + self.losing_trades;
        let win_rate = if total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(total_trades)
                * Decimal::from(100)
        };
        EngineStatus {
            is_running,
            market_open,
            virtual_capital: self.virtual_capital,
            available_capital: self.available_capital,
            used_capital: self.used_capital(),
            total_pnl: self.total_pnl,
            daily_pnl: self.daily_pnl,
            total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            win_rate,
            active_positions: self.positions.values().filter(|p| p.is_open()).count(),
            pending_orders: self
                .orders
                .values()
                .filter(|o| o.status == OrderStatus::Pending)
                .count(),
            last_updated: Utc::now(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            virtual_capital: self.virtual_capital,
            available_capital: self.available_capital,
            total_pnl: self.total_pnl,
            daily_pnl: self.daily_pnl,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            order_counter: self.order_counter,
            position_counter: self.position_counter,
            last_saved: Utc::now(),
        }
    }

    /// Capital conservation check used by tests:
    /// `available + Σ(open entry notional) == virtual + total_pnl`.
    #[must_use]
    pub fn capital_balances(&self) -> bool {
        self.available_capital + self.used_capital() == self.virtual_capital + self.total_pnl
    }
}
