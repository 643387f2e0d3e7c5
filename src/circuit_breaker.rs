use std::{collections::BTreeMap, time::Duration};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::platform::Platform;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

// The state is never stored: it is derived from these two fields on every read.
#[derive(Debug, Clone, Copy, Default)]
struct BreakerRecord {
    failure_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerRecord {
    fn state(&self, config: &CircuitBreakerConfig) -> CircuitState {
        if self.failure_count < config.failure_threshold {
            return CircuitState::Closed;
        }
        match self.last_failure {
            Some(at) if at.elapsed() < config.reset_timeout() => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    fn retry_after(&self, config: &CircuitBreakerConfig) -> Option<Duration> {
        match self.state(config) {
            CircuitState::Open => self
                .last_failure
                .map(|at| config.reset_timeout().saturating_sub(at.elapsed())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub platform: Platform,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_ms_ago: Option<u64>,
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    records: DashMap<Platform, BreakerRecord>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn record(&self, platform: Platform) -> BreakerRecord {
        self.records
            .get(&platform)
            .map(|r| *r.value())
            .unwrap_or_default()
    }

    pub fn state(&self, platform: Platform) -> CircuitState {
        self.record(platform).state(&self.config)
    }

    pub fn is_open(&self, platform: Platform) -> bool {
        self.state(platform) == CircuitState::Open
    }

    /// Remaining cool-down while the circuit is open.
    pub fn retry_after(&self, platform: Platform) -> Option<Duration> {
        self.record(platform).retry_after(&self.config)
    }

    /// A success while half-open closes the circuit. Returns true when that happened.
    pub fn record_success(&self, platform: Platform) -> bool {
        let closed = self
            .records
            .remove_if(&platform, |_, r| r.state(&self.config) == CircuitState::HalfOpen)
            .is_some();
        if closed {
            info!(platform = %platform, "circuit breaker closed after successful trial call");
        }
        closed
    }

    pub fn record_failure(&self, platform: Platform) -> CircuitState {
        let mut record = self.records.entry(platform).or_default();
        let before = record.state(&self.config);
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_failure = Some(Instant::now());
        let after = record.state(&self.config);

        if after == CircuitState::Open && before != CircuitState::Open {
            warn!(
                platform = %platform,
                failures = record.failure_count,
                "circuit breaker opened"
            );
        }
        after
    }

    pub fn status(&self, platform: Platform) -> CircuitBreakerStatus {
        let record = self.record(platform);
        CircuitBreakerStatus {
            platform,
            state: record.state(&self.config),
            failure_count: record.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_ms_ago: record.last_failure.map(|at| at.elapsed().as_millis() as u64),
            retry_after_ms: record
                .retry_after(&self.config)
                .map(|d| d.as_millis() as u64),
        }
    }

    /// Status of every platform that has recorded at least one failure.
    pub fn all_statuses(&self) -> BTreeMap<Platform, CircuitBreakerStatus> {
        let platforms: Vec<Platform> = self.records.iter().map(|r| *r.key()).collect();
        platforms
            .into_iter()
            .map(|p| (p, self.status(p)))
            .collect()
    }

    pub fn reset(&self, platform: Platform) -> bool {
        self.records.remove(&platform).is_some()
    }

    pub fn reset_all(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }
}
