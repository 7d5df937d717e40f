//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use coinalyze_exporter::fetcher::{
    FetcherError, FetcherResult, HistoryFetcher, NormalizedPayload, RetryPolicy,
};
use coinalyze_exporter::registry::{EndpointRegistry, QueryContext};
use coinalyze_exporter::shutdown::SharedShutdown;
use coinalyze_exporter::Interval;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Built-in registry with pacing disabled
pub fn fast_registry() -> EndpointRegistry {
    let mut registry = EndpointRegistry::builtin().unwrap();
    registry.set_all_pacing(Duration::ZERO);
    registry
}

/// Retry policy scaled down to milliseconds
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(10),
        backoff_factor: 1.8,
        max_backoff: Duration::from_millis(50),
        rate_limit_default: Duration::from_millis(400),
        rate_limit_floor: Duration::from_millis(200),
        rate_limit_max: Duration::from_millis(300),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Failure injected by [`ScriptedFetcher`]
#[derive(Clone, Copy)]
pub enum Inject {
    /// Fail units whose window starts on this day
    FailDay(NaiveDate),
    /// Fail every unit
    FailAll,
    /// Request shutdown while serving the Nth call (1-based)
    ShutdownOnCall(usize),
}

/// In-memory fetcher that records every call as `symbol/interval/from/category`
#[derive(Clone)]
pub struct ScriptedFetcher {
    pub calls: Arc<Mutex<Vec<String>>>,
    inject: Vec<Inject>,
    shutdown: Option<SharedShutdown>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            inject: Vec::new(),
            shutdown: None,
        }
    }

    pub fn with(mut self, inject: Inject) -> Self {
        self.inject.push(inject);
        self
    }

    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn call_label(symbol: &str, interval: Interval, day: NaiveDate, category: &str) -> String {
    let from = day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    format!("{symbol}/{interval}/{from}/{category}")
}

#[async_trait]
impl HistoryFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        category: &str,
        params: &QueryContext<'_>,
    ) -> FetcherResult<NormalizedPayload> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(format!(
                "{}/{}/{}/{}",
                params.symbol, params.interval, params.from, category
            ));
            calls.len()
        };

        for inject in &self.inject {
            match *inject {
                Inject::FailAll => {
                    return Err(FetcherError::ExhaustedRetries {
                        attempts: 8,
                        last_error: "server error (503)".to_string(),
                    })
                }
                Inject::FailDay(day) => {
                    let from = day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
                    if params.from == from {
                        return Err(FetcherError::ExhaustedRetries {
                            attempts: 8,
                            last_error: "server error (503)".to_string(),
                        });
                    }
                }
                Inject::ShutdownOnCall(n) => {
                    if call_number == n {
                        if let Some(shutdown) = &self.shutdown {
                            shutdown.request_shutdown();
                        }
                    }
                }
            }
        }

        Ok(NormalizedPayload::new(vec![
            json!({"t": params.from, "v": 5}),
        ]))
    }
}
