use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use regex::{Regex, RegexBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus},
    error::{Result, TravelError},
    platform::Platform,
};

const DEFAULT_METRICS_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Auth,
    Server,
    Validation,
    Platform,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::RateLimit => "RATE_LIMIT",
            ErrorCategory::Auth => "AUTH",
            ErrorCategory::Server => "SERVER",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Platform => "PLATFORM",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::RateLimit
                | ErrorCategory::Server
                | ErrorCategory::Platform
        )
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorCategory::Validation => Severity::Low,
            ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::Platform => {
                Severity::Medium
            }
            ErrorCategory::Server | ErrorCategory::Unknown => Severity::High,
            ErrorCategory::Auth => Severity::Critical,
        }
    }

    fn delay_multiplier(&self) -> f64 {
        match self {
            ErrorCategory::RateLimit => 2.0,
            ErrorCategory::Server => 1.5,
            _ => 1.0,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub retryable: bool,
    pub severity: Severity,
    pub error_type: String,
}

impl ErrorClassification {
    fn of(category: ErrorCategory, error_type: &str) -> Self {
        Self {
            category,
            retryable: category.is_retryable(),
            severity: category.severity(),
            error_type: error_type.to_string(),
        }
    }
}

/// Raised once retries are exhausted or the failure is not worth retrying.
#[derive(Error, Debug, Clone)]
#[error("{} error after {attempts} attempt(s): {source}", .classification.category)]
pub struct EnhancedError {
    pub platform: Platform,
    pub classification: ErrorClassification,
    pub attempts: u32,
    pub context: Option<String>,
    #[source]
    pub source: TravelError,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub platform: Platform,
    pub max_retries: Option<u32>,
    pub context: Option<String>,
}

impl RetryOptions {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            max_retries: None,
            context: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

pub struct RecoveryContext<'a> {
    pub platform: Platform,
    pub error: &'a TravelError,
    pub classification: &'a ErrorClassification,
    pub attempts: u32,
    pub context: Option<&'a str>,
}

/// Last chance to produce a value after a call has failed for good.
pub trait RecoveryStrategy: Send + Sync + fmt::Debug {
    fn recover(&self, ctx: &RecoveryContext<'_>) -> Option<Value>;
}

#[derive(Debug, Default)]
pub struct NoRecovery;

impl RecoveryStrategy for NoRecovery {
    fn recover(&self, _ctx: &RecoveryContext<'_>) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastError {
    pub message: String,
    pub category: ErrorCategory,
    pub error_type: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformErrorMetrics {
    pub total_errors: u64,
    pub retryable_errors: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub last_error: Option<LastError>,
    #[serde(skip)]
    last_activity: Option<Instant>,
}

#[derive(Debug)]
struct PatternGroup {
    category: ErrorCategory,
    error_type: &'static str,
    regex: Regex,
}

#[derive(Debug)]
struct PlatformOverride {
    platform: Platform,
    error_type: &'static str,
    regex: Regex,
}

// Ordered: the first matching group decides the category.
const PATTERN_GROUPS: &[(ErrorCategory, &str, &str)] = &[
    (
        ErrorCategory::Network,
        "network_error",
        r"timeout|timed out|econnreset|econnrefused|enotfound|socket hang up|connection (reset|refused|closed|error)|network error|dns",
    ),
    (
        ErrorCategory::RateLimit,
        "rate_limited",
        r"\b429\b|rate.?limit|too many requests|quota exceeded",
    ),
    (
        ErrorCategory::Auth,
        "auth_failed",
        r"\b(401|403)\b|unauthori[sz]ed|forbidden|invalid api key|not subscribed",
    ),
    (
        ErrorCategory::Server,
        "server_error",
        r"\b(500|502|503|504)\b|internal server error|bad gateway|service unavailable",
    ),
    (
        ErrorCategory::Validation,
        "validation_error",
        r"\b(400|404|422)\b|invalid|validation|required|bad request|not supported|malformed",
    ),
    (
        ErrorCategory::Platform,
        "platform_error",
        r"provider error|failed to decode|unexpected response|no results",
    ),
];

// Known business-rule failures that retrying can never fix.
const PLATFORM_OVERRIDES: &[(Platform, &str, &str)] = &[
    (
        Platform::Booking,
        "invalid_destination",
        r"dest_?id|destination id|unknown destination",
    ),
    (
        Platform::Skyscanner,
        "invalid_place",
        r"(sky|entity|place) ?id|unknown airport",
    ),
    (
        Platform::Airbnb,
        "listing_unavailable",
        r"(listing|property) (not found|unavailable)",
    ),
    (Platform::TripAdvisor, "invalid_geo", r"geo ?id"),
];

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "skipping invalid error pattern");
            None
        }
    }
}

#[derive(Debug)]
pub struct ErrorHandler {
    config: RetryConfig,
    breaker: CircuitBreaker,
    patterns: Vec<PatternGroup>,
    overrides: Vec<PlatformOverride>,
    recovery: RwLock<HashMap<ErrorCategory, Arc<dyn RecoveryStrategy>>>,
    metrics: DashMap<Platform, PlatformErrorMetrics>,
    metrics_retention: Duration,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(RetryConfig::default(), CircuitBreakerConfig::default())
    }
}

impl ErrorHandler {
    pub fn new(config: RetryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        let patterns = PATTERN_GROUPS
            .iter()
            .filter_map(|(category, error_type, pattern)| {
                Some(PatternGroup {
                    category: *category,
                    error_type: *error_type,
                    regex: compile(pattern)?,
                })
            })
            .collect();

        let overrides = PLATFORM_OVERRIDES
            .iter()
            .filter_map(|(platform, error_type, pattern)| {
                Some(PlatformOverride {
                    platform: *platform,
                    error_type: *error_type,
                    regex: compile(pattern)?,
                })
            })
            .collect();

        let mut recovery: HashMap<ErrorCategory, Arc<dyn RecoveryStrategy>> = HashMap::new();
        for category in [
            ErrorCategory::Network,
            ErrorCategory::RateLimit,
            ErrorCategory::Auth,
            ErrorCategory::Server,
            ErrorCategory::Validation,
            ErrorCategory::Platform,
            ErrorCategory::Unknown,
        ] {
            recovery.insert(category, Arc::new(NoRecovery));
        }

        Self {
            config,
            breaker: CircuitBreaker::new(breaker_config),
            patterns,
            overrides,
            recovery: RwLock::new(recovery),
            metrics: DashMap::new(),
            metrics_retention: DEFAULT_METRICS_RETENTION,
        }
    }

    pub fn with_metrics_retention(mut self, retention: Duration) -> Self {
        self.metrics_retention = retention;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn register_recovery_strategy(
        &self,
        category: ErrorCategory,
        strategy: Arc<dyn RecoveryStrategy>,
    ) {
        self.recovery.write().insert(category, strategy);
    }

    pub fn classify(&self, error: &TravelError, platform: Platform) -> ErrorClassification {
        let mut classification = match error {
            TravelError::RetriesExhausted(enhanced) => return enhanced.classification.clone(),
            TravelError::CircuitOpen { .. } => ErrorClassification {
                retryable: false,
                ..ErrorClassification::of(ErrorCategory::Platform, "circuit_open")
            },
            TravelError::Timeout { .. } => ErrorClassification::of(ErrorCategory::Network, "timeout"),
            TravelError::NotSupported { .. } => {
                ErrorClassification::of(ErrorCategory::Validation, "not_supported")
            }
            TravelError::InvalidRequest(_) | TravelError::UnknownPlatform(_) => {
                ErrorClassification::of(ErrorCategory::Validation, "invalid_request")
            }
            TravelError::Decode { .. } => {
                ErrorClassification::of(ErrorCategory::Platform, "decode_error")
            }
            other => self.classify_message(&other.to_string()),
        };

        let message = error.to_string();
        if let Some(rule) = self
            .overrides
            .iter()
            .find(|o| o.platform == platform && o.regex.is_match(&message))
        {
            classification.retryable = false;
            classification.error_type = rule.error_type.to_string();
        }

        classification
    }

    fn classify_message(&self, message: &str) -> ErrorClassification {
        self.patterns
            .iter()
            .find(|group| group.regex.is_match(message))
            .map(|group| ErrorClassification::of(group.category, group.error_type))
            .unwrap_or_else(|| ErrorClassification {
                retryable: false,
                ..ErrorClassification::of(ErrorCategory::Unknown, "unknown_error")
            })
    }

    /// Backoff before jitter: `min(max, base * multiplier^attempt * category factor)`.
    pub fn base_delay_for(&self, attempt: u32, category: ErrorCategory) -> Duration {
        let raw = self.config.base_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32)
            * category.delay_multiplier();
        let capped = raw.min(self.config.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn calculate_delay(&self, attempt: u32, category: ErrorCategory) -> Duration {
        let base = self.base_delay_for(attempt, category).as_millis() as f64;
        let spread = base * self.config.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        let delay = (base + jitter).clamp(0.0, self.config.max_delay_ms as f64);
        Duration::from_millis(delay as u64)
    }

    /// Runs `operation`, retrying retryable failures with backoff, behind the platform's
    /// circuit breaker.
    pub async fn execute_with_retry<T, F, Fut>(&self, mut operation: F, options: RetryOptions) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: DeserializeOwned,
    {
        let platform = options.platform;
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);

        if self.breaker.is_open(platform) {
            let retry_after_ms = self
                .breaker
                .retry_after(platform)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            return Err(TravelError::CircuitOpen {
                platform,
                retry_after_ms,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            let failure = match operation().await {
                Ok(value) => {
                    self.breaker.record_success(platform);
                    return Ok(value);
                }
                Err(e) => e,
            };

            let classification = self.classify(&failure, platform);
            self.record_error(platform, &failure, &classification);

            if !classification.retryable || attempt >= max_retries {
                // caller errors say nothing about the provider's health
                if !failure.is_caller_error() {
                    self.breaker.record_failure(platform);
                }

                let ctx = RecoveryContext {
                    platform,
                    error: &failure,
                    classification: &classification,
                    attempts: attempt + 1,
                    context: options.context.as_deref(),
                };
                if let Some(value) = self.try_recover(&ctx) {
                    return Ok(value);
                }

                error!(
                    platform = %platform,
                    category = %classification.category,
                    attempts = attempt + 1,
                    context = options.context.as_deref().unwrap_or(""),
                    error = %failure,
                    "giving up on platform call"
                );
                return Err(TravelError::RetriesExhausted(Box::new(EnhancedError {
                    platform,
                    classification,
                    attempts: attempt + 1,
                    context: options.context.clone(),
                    source: failure,
                })));
            }

            let delay = self.calculate_delay(attempt, classification.category);
            warn!(
                platform = %platform,
                category = %classification.category,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retrying platform call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn try_recover<T: DeserializeOwned>(&self, ctx: &RecoveryContext<'_>) -> Option<T> {
        let strategy = self.recovery.read().get(&ctx.classification.category).cloned()?;
        let value = strategy.recover(ctx)?;
        match serde_json::from_value(value) {
            Ok(recovered) => Some(recovered),
            Err(e) => {
                warn!(platform = %ctx.platform, error = %e, "recovery produced an unusable value");
                None
            }
        }
    }

    fn record_error(&self, platform: Platform, error: &TravelError, classification: &ErrorClassification) {
        self.prune_stale_metrics();

        let mut metrics = self.metrics.entry(platform).or_default();
        metrics.total_errors += 1;
        if classification.retryable {
            metrics.retryable_errors += 1;
        }
        *metrics
            .by_type
            .entry(classification.error_type.clone())
            .or_insert(0) += 1;
        *metrics.by_category.entry(classification.category).or_insert(0) += 1;
        metrics.last_error = Some(LastError {
            message: error.to_string(),
            category: classification.category,
            error_type: classification.error_type.clone(),
            at: Utc::now(),
        });
        metrics.last_activity = Some(Instant::now());
    }

    /// Drops metrics for platforms with no errors within the retention window.
    pub fn prune_stale_metrics(&self) -> usize {
        let before = self.metrics.len();
        let retention = self.metrics_retention;
        self.metrics.retain(|_, m| {
            m.last_activity
                .map(|at| at.elapsed() < retention)
                .unwrap_or(false)
        });
        before - self.metrics.len()
    }

    pub fn error_metrics(&self, platform: Platform) -> Option<PlatformErrorMetrics> {
        self.metrics.get(&platform).map(|m| m.value().clone())
    }

    pub fn all_error_metrics(&self) -> BTreeMap<Platform, PlatformErrorMetrics> {
        self.metrics
            .iter()
            .map(|m| (*m.key(), m.value().clone()))
            .collect()
    }

    pub fn circuit_breaker_status(&self, platform: Platform) -> CircuitBreakerStatus {
        self.breaker.status(platform)
    }

    pub fn all_circuit_breaker_statuses(&self) -> BTreeMap<Platform, CircuitBreakerStatus> {
        self.breaker.all_statuses()
    }

    pub fn reset_circuit_breaker(&self, platform: Platform) -> bool {
        self.breaker.reset(platform)
    }

    pub fn reset_all_circuit_breakers(&self) -> usize {
        self.breaker.reset_all()
    }
}
