//! API credential pool with round-robin rotation
//!
//! The pool is owned by the client that uses it; there is no process-wide
//! key cycle. The cursor is atomic so a shared client stays sound if callers
//! ever fetch concurrently.

use super::{FetcherError, FetcherResult};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered set of API tokens with a round-robin cursor
pub struct CredentialPool {
    tokens: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Build a pool from tokens; blank entries are dropped
    ///
    /// # Errors
    /// Returns [`FetcherError::Configuration`] if no usable token remains.
    pub fn new<I, S>(tokens: I) -> FetcherResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<String> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(FetcherError::Configuration(
                "credential pool is empty".to_string(),
            ));
        }

        Ok(Self {
            tokens,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Build a pool from a comma-separated list
    pub fn from_delimited(value: &str) -> FetcherResult<Self> {
        Self::new(value.split(','))
    }

    /// Number of tokens in the pool
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false; an empty pool cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Take the next token, advancing the cursor
    pub fn next_token(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.tokens.len();
        &self.tokens[index]
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}
