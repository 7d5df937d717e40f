//! Export requests and deterministic work-unit enumeration

use super::ExportError;
use crate::registry::{EndpointRegistry, QueryContext};
use crate::unit::DayWindow;
use crate::{Interval, MarketSymbol, UnitKey};
use chrono::{Days, NaiveDate, Utc};
use std::collections::HashSet;
use std::hash::Hash;

/// What to export: every combination of symbol, interval, day and category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    symbols: Vec<MarketSymbol>,
    intervals: Vec<Interval>,
    start: NaiveDate,
    end: NaiveDate,
    categories: Vec<String>,
}

impl ExportRequest {
    /// Validate and build a request
    ///
    /// # Arguments
    /// * `end` - Inclusive last day; defaults to the current UTC day
    ///
    /// # Errors
    /// [`ExportError::InvalidRequest`] on empty or duplicated dimensions, or `start > end`.
    pub fn new(
        symbols: Vec<MarketSymbol>,
        intervals: Vec<Interval>,
        start: NaiveDate,
        end: Option<NaiveDate>,
        categories: Vec<String>,
    ) -> Result<Self, ExportError> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());

        require_unique("symbols", &symbols)?;
        require_unique("intervals", &intervals)?;
        require_unique("categories", &categories)?;

        if start > end {
            return Err(ExportError::InvalidRequest(format!(
                "start day {start} is after end day {end}"
            )));
        }

        Ok(Self {
            symbols,
            intervals,
            start,
            end,
            categories,
        })
    }

    /// Symbols, in enumeration order
    pub fn symbols(&self) -> &[MarketSymbol] {
        &self.symbols
    }

    /// Intervals, in enumeration order
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// First day (inclusive)
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive)
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Categories, in enumeration order
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Number of days in the range
    pub fn day_count(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// Total number of units the request expands to
    pub fn unit_count(&self) -> u64 {
        self.symbols.len() as u64
            * self.intervals.len() as u64
            * self.day_count()
            * self.categories.len() as u64
    }

    /// Ensure every category is known to the registry
    pub fn check_categories(&self, registry: &EndpointRegistry) -> Result<(), ExportError> {
        for category in &self.categories {
            registry
                .require(category)
                .map_err(|e| ExportError::InvalidRequest(e.to_string()))?;
        }
        Ok(())
    }

    /// Enumerate the request's units
    pub fn units(&self) -> WorkUnitEnumerator<'_> {
        WorkUnitEnumerator::new(self)
    }
}

fn require_unique<T: Eq + Hash + std::fmt::Debug>(
    name: &str,
    items: &[T],
) -> Result<(), ExportError> {
    if items.is_empty() {
        return Err(ExportError::InvalidRequest(format!("{name} must not be empty")));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item) {
            return Err(ExportError::InvalidRequest(format!(
                "duplicate entry in {name}: {item:?}"
            )));
        }
    }
    Ok(())
}

/// One fetch task with its request window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Unit identity
    pub key: UnitKey,
    /// UTC day window sent upstream
    pub window: DayWindow,
}

impl WorkUnit {
    /// Build a unit for a key
    pub fn new(key: UnitKey) -> Self {
        let window = key.window();
        Self { key, window }
    }

    /// Query parameters for this unit
    pub fn query(&self) -> QueryContext<'_> {
        QueryContext {
            symbol: self.key.symbol.as_str(),
            interval: self.key.interval,
            from: self.window.from,
            to: self.window.to,
        }
    }
}

/// Iterator over units in symbol → interval → day → category order
///
/// The sequence is a pure function of the request, so a restarted run
/// visits units in exactly the same order.
#[derive(Debug, Clone)]
pub struct WorkUnitEnumerator<'a> {
    request: &'a ExportRequest,
    symbol: usize,
    interval: usize,
    day: u64,
    category: usize,
    remaining: u64,
}

impl<'a> WorkUnitEnumerator<'a> {
    /// Start enumerating a request from its first unit
    pub fn new(request: &'a ExportRequest) -> Self {
        Self {
            request,
            symbol: 0,
            interval: 0,
            day: 0,
            category: 0,
            remaining: request.unit_count(),
        }
    }

    fn advance(&mut self) {
        self.category += 1;
        if self.category < self.request.categories.len() {
            return;
        }
        self.category = 0;
        self.day += 1;
        if self.day < self.request.day_count() {
            return;
        }
        self.day = 0;
        self.interval += 1;
        if self.interval < self.request.intervals.len() {
            return;
        }
        self.interval = 0;
        self.symbol += 1;
    }
}

impl Iterator for WorkUnitEnumerator<'_> {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let day = self.request.start.checked_add_days(Days::new(self.day))?;
        let key = UnitKey::new(
            self.request.symbols[self.symbol].clone(),
            self.request.intervals[self.interval],
            day,
            self.request.categories[self.category].clone(),
        );

        self.remaining -= 1;
        self.advance();
        Some(WorkUnit::new(key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WorkUnitEnumerator<'_> {}
