//! Upstream market symbol parsing and validation
//!
//! Symbols such as `BTCUSDT_PERP.A` are sent upstream verbatim and also become
//! directory and state-file names, so they are restricted to a path-safe
//! alphabet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market symbol as understood by the upstream API
///
/// # Examples
///
/// ```
/// use coinalyze_exporter::symbol::MarketSymbol;
///
/// let symbol = MarketSymbol::parse("BTCUSDT_PERP.A").unwrap();
/// assert_eq!(symbol.as_str(), "BTCUSDT_PERP.A");
/// assert!(MarketSymbol::parse("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketSymbol(String);

impl MarketSymbol {
    /// Parse and validate a symbol
    ///
    /// Surrounding whitespace is trimmed; case is preserved because the
    /// upstream exchange suffix (`.A`, `.6`) is case sensitive.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty, is `.`/`..`, or contains a
    /// character outside `[A-Za-z0-9_.-]`.
    pub fn parse(s: &str) -> Result<Self, SymbolError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SymbolError::InvalidFormat(
                "symbol cannot be empty".to_string(),
            ));
        }

        if s == "." || s == ".." {
            return Err(SymbolError::InvalidFormat(format!(
                "symbol '{s}' is not a valid path component"
            )));
        }

        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(SymbolError::InvalidFormat(format!(
                "symbol '{s}' contains invalid character '{bad}'"
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// Get the symbol text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MarketSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MarketSymbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MarketSymbol> for String {
    fn from(symbol: MarketSymbol) -> Self {
        symbol.0
    }
}

/// Errors that can occur during symbol parsing
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    /// Invalid symbol format
    #[error("symbol error: {0}")]
    InvalidFormat(String),
}
