use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};

use crate::config::EngineConfig;

/// Trading-session clock for a single exchange.
///
/// The window is inclusive on both ends and applies Monday through Friday in
/// the exchange's local time.
#[derive(Debug, Clone, Copy)]
pub struct MarketHours {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
}

impl MarketHours {
    /// # Errors
    ///
    /// Returns an error if the open/close strings are not `HH:MM` or the UTC
    /// offset is out of range.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let open = NaiveTime::parse_from_str(&config.market_open, "%H:%M")
            .with_context(|| format!("invalid market_open '{}'", config.market_open))?;
        let close = NaiveTime::parse_from_str(&config.market_close, "%H:%M")
            .with_context(|| format!("invalid market_close '{}'", config.market_close))?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .with_context(|| format!("invalid utc_offset_minutes {}", config.utc_offset_minutes))?;
        Ok(Self {
            open,
            close,
            offset,
        })
    }

    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        let weekday = local.weekday().number_from_monday();
        if weekday > 5 {
            return false;
        }
        let time = local.time();
        time >= self.open && time <= self.close
    }

    #[must_use]
    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}
