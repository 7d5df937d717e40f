//! Work unit identity and day windows
//!
//! A unit is the atomic fetch task (symbol, interval, UTC day, category).
//! [`UnitKey`] is the logical key shared by the completion store and the
//! snapshot sink; neither stores paths in the other's terms.

use crate::{Interval, MarketSymbol};
use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compact day format used in directory names and store entries
pub const DAY_DIR_FORMAT: &str = "%Y%m%d";

/// Globally unique identity of one work unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Market symbol
    pub symbol: MarketSymbol,
    /// Aggregation interval
    pub interval: Interval,
    /// UTC calendar day
    pub day: NaiveDate,
    /// Registry category
    pub category: String,
}

impl UnitKey {
    /// Create a key
    pub fn new(
        symbol: MarketSymbol,
        interval: Interval,
        day: NaiveDate,
        category: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            interval,
            day,
            category: category.into(),
        }
    }

    /// Day as `YYYYMMDD`
    pub fn day_dir(&self) -> String {
        self.day.format(DAY_DIR_FORMAT).to_string()
    }

    /// Entry name inside a per-(symbol, interval) store file: `YYYYMMDD/category`
    pub fn entry_name(&self) -> String {
        format!("{}/{}", self.day_dir(), self.category)
    }

    /// Request window covering the key's day
    pub fn window(&self) -> DayWindow {
        DayWindow::for_day(self.day)
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.symbol, self.interval, self.day, self.category
        )
    }
}

/// One UTC day as unix seconds: `[from, to]` with `to` one second before next midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// Day start (00:00:00 UTC)
    pub from: i64,
    /// Next midnight minus one second
    pub to: i64,
}

impl DayWindow {
    /// Window for a calendar day
    pub fn for_day(day: NaiveDate) -> Self {
        let from = day.and_time(NaiveTime::MIN).and_utc().timestamp();
        let next = day
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
            .unwrap_or(from + 86_400);
        Self { from, to: next - 1 }
    }
}
