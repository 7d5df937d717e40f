//! Response normalisation
//!
//! History endpoints answer in one of three shapes depending on deployment:
//! a bare array of records, `{"history": [...]}`, or
//! `[{"symbol": ..., "history": [...]}]`. [`ResponseShape`] classifies a
//! decoded body into exactly one of these (or [`ResponseShape::Unrecognized`])
//! and [`NormalizedPayload`] is the plain record list that remains.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Ordered list of upstream records, independent of response shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPayload(Vec<Value>);

impl NormalizedPayload {
    /// Wrap an already-unwrapped record list
    pub fn new(records: Vec<Value>) -> Self {
        Self(records)
    }

    /// Classify and unwrap a decoded response body
    pub fn from_value(value: Value) -> Self {
        ResponseShape::classify(value).into_payload()
    }

    /// Records in upstream order
    pub fn records(&self) -> &[Value] {
        &self.0
    }

    /// Consume into the record list
    pub fn into_records(self) -> Vec<Value> {
        self.0
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload carries no records
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accepted response shapes
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// `[record, ...]`
    Bare(Vec<Value>),
    /// `{"history": [record, ...]}`
    Wrapped(Vec<Value>),
    /// `[{"symbol": ..., "history": [record, ...]}, ...]`
    ///
    /// Requests carry a single symbol, so only the first entry is used.
    PerSymbol {
        /// Symbol echoed by the first entry, if any
        symbol: Option<String>,
        /// History of the first entry
        history: Vec<Value>,
        /// Entries beyond the first, ignored
        ignored_entries: usize,
    },
    /// Anything else, including `{}`; normalises to no records
    Unrecognized,
}

impl ResponseShape {
    /// Classify a decoded body
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                let per_symbol = items
                    .first()
                    .and_then(Value::as_object)
                    .is_some_and(|first| first.contains_key("history"));

                if !per_symbol {
                    return ResponseShape::Bare(items);
                }

                let ignored_entries = items.len() - 1;
                let mut items = items.into_iter();
                let mut first = match items.next() {
                    Some(Value::Object(map)) => map,
                    _ => return ResponseShape::Unrecognized,
                };
                ResponseShape::PerSymbol {
                    symbol: first
                        .get("symbol")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    history: history_list(first.remove("history")),
                    ignored_entries,
                }
            }
            Value::Object(mut map) if map.contains_key("history") => {
                ResponseShape::Wrapped(history_list(map.remove("history")))
            }
            _ => ResponseShape::Unrecognized,
        }
    }

    /// Extract the record list
    pub fn into_payload(self) -> NormalizedPayload {
        match self {
            ResponseShape::Bare(records) | ResponseShape::Wrapped(records) => {
                NormalizedPayload(records)
            }
            ResponseShape::PerSymbol {
                symbol,
                history,
                ignored_entries,
            } => {
                if ignored_entries > 0 {
                    debug!(
                        symbol = symbol.as_deref().unwrap_or("?"),
                        ignored_entries, "Response carried more than one symbol entry"
                    );
                }
                NormalizedPayload(history)
            }
            ResponseShape::Unrecognized => NormalizedPayload::default(),
        }
    }
}

/// `null` or a non-array `history` counts as empty
fn history_list(history: Option<Value>) -> Vec<Value> {
    match history {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    }
}
