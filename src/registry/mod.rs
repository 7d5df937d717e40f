//! Endpoint registry for upstream data categories
//!
//! Each data category (open interest, funding rate, ...) is described by an
//! [`EndpointDescriptor`]: the primary path, ordered fallback paths, the
//! query parameter schema and the pacing interval the scheduler waits before
//! every request of that category.
//!
//! The built-in descriptors are embedded from `endpoints.json`; a custom
//! registry can be loaded from a file with the same schema.

use crate::Interval;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Embedded registry data
const ENDPOINTS_JSON: &str = include_str!("endpoints.json");

/// Built-in registry (parsed once)
static BUILTIN: Lazy<Result<EndpointRegistry, RegistryError>> =
    Lazy::new(|| EndpointRegistry::from_json(ENDPOINTS_JSON));

/// Registry of endpoint descriptors, in declaration order
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    schema_version: String,
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    /// Owned copy of the embedded registry
    pub fn builtin() -> Result<Self, RegistryError> {
        BUILTIN.as_ref().map(Clone::clone).map_err(Clone::clone)
    }

    /// Load a registry from a JSON file
    pub fn load_file(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::ParseError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Parse registry from JSON string
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse registry: {e}")))?;

        let mut endpoints: Vec<EndpointDescriptor> = Vec::with_capacity(raw.endpoints.len());
        for endpoint in raw.endpoints {
            endpoint.validate()?;
            if endpoints.iter().any(|e| e.category == endpoint.category) {
                return Err(RegistryError::ParseError(format!(
                    "Duplicate category '{}'",
                    endpoint.category
                )));
            }
            endpoints.push(endpoint);
        }

        Ok(Self {
            schema_version: raw.schema_version,
            endpoints,
        })
    }

    /// Registry schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// All descriptors in declaration order
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Category names in declaration order
    pub fn categories(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.category.as_str()).collect()
    }

    /// Look up a descriptor by category name
    pub fn get(&self, category: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.category == category)
    }

    /// Look up a descriptor, failing with [`RegistryError::NotFound`]
    pub fn require(&self, category: &str) -> Result<&EndpointDescriptor, RegistryError> {
        self.get(category)
            .ok_or_else(|| RegistryError::NotFound(category.to_string()))
    }

    /// Override the pacing of one category
    pub fn set_pacing(&mut self, category: &str, pacing: Duration) -> Result<(), RegistryError> {
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|e| e.category == category)
            .ok_or_else(|| RegistryError::NotFound(category.to_string()))?;
        endpoint.pacing_ms = pacing.as_millis() as u64;
        Ok(())
    }

    /// Override the pacing of every category
    pub fn set_all_pacing(&mut self, pacing: Duration) {
        for endpoint in &mut self.endpoints {
            endpoint.pacing_ms = pacing.as_millis() as u64;
        }
    }
}

/// Description of one upstream history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    category: String,
    #[serde(default)]
    description: String,
    path: String,
    #[serde(default)]
    fallback_paths: Vec<String>,
    params: Vec<ParamSpec>,
    pacing_ms: u64,
}

impl EndpointDescriptor {
    /// Build a descriptor in code
    pub fn new(
        category: impl Into<String>,
        path: impl Into<String>,
        fallback_paths: Vec<String>,
        params: Vec<ParamSpec>,
        pacing: Duration,
    ) -> Self {
        Self {
            category: category.into(),
            description: String::new(),
            path: path.into(),
            fallback_paths,
            params,
            pacing_ms: pacing.as_millis() as u64,
        }
    }

    /// Category name (e.g. "oi")
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Human description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Primary path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fallback paths tried in order after a 404
    pub fn fallback_paths(&self) -> &[String] {
        &self.fallback_paths
    }

    /// Primary path followed by fallbacks
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.fallback_paths.iter().map(String::as_str))
    }

    /// Parameter schema
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Pacing interval before each request of this category
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Render query parameters for one request
    pub fn query(&self, ctx: &QueryContext<'_>) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|param| match param {
                ParamSpec::Symbols => ("symbols".to_string(), ctx.symbol.to_string()),
                ParamSpec::Interval => ("interval".to_string(), ctx.interval.to_string()),
                ParamSpec::From => ("from".to_string(), ctx.from.to_string()),
                ParamSpec::To => ("to".to_string(), ctx.to.to_string()),
                ParamSpec::Fixed { name, value } => (name.clone(), value.clone()),
            })
            .collect()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.category.trim().is_empty() {
            return Err(RegistryError::ParseError(
                "Category name cannot be empty".to_string(),
            ));
        }
        // Category names become file names under the data tree
        if self.category == "." || self.category == ".." {
            return Err(RegistryError::ParseError(format!(
                "Category '{}' is not a valid path component",
                self.category
            )));
        }
        if let Some(bad) = self
            .category
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(RegistryError::ParseError(format!(
                "Category '{}' contains invalid character '{bad}'",
                self.category
            )));
        }
        for path in self.paths() {
            if !path.starts_with('/') {
                return Err(RegistryError::ParseError(format!(
                    "Path '{path}' of category '{}' must start with '/'",
                    self.category
                )));
            }
        }
        Ok(())
    }
}

/// One entry of an endpoint's query parameter schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSpec {
    /// `symbols=<symbol>`
    Symbols,
    /// `interval=<interval>`
    Interval,
    /// `from=<unix seconds>`
    From,
    /// `to=<unix seconds>`
    To,
    /// A constant parameter
    Fixed {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },
}

/// Values substituted into a [`ParamSpec`] schema
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Market symbol
    pub symbol: &'a str,
    /// Aggregation interval
    pub interval: Interval,
    /// Window start, unix seconds
    pub from: i64,
    /// Window end (inclusive), unix seconds
    pub to: i64,
}

/// Raw registry structure for deserialization
#[derive(Debug, Deserialize)]
struct RawRegistry {
    schema_version: String,
    #[allow(dead_code)]
    last_updated: String,
    endpoints: Vec<EndpointDescriptor>,
}

/// Errors that can occur when working with the registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Failed to parse registry JSON
    #[error("registry parse error: {0}")]
    ParseError(String),

    /// Category not found in registry
    #[error("unknown category: {0}")]
    NotFound(String),
}
