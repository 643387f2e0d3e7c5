use std::time::Duration;

use serde::Deserialize;

use crate::{
    adapters::{airbnb, booking, skyscanner, tripadvisor, AdapterConfig},
    cache::CacheConfig,
    circuit_breaker::CircuitBreakerConfig,
    error::TravelError,
    error_handler::RetryConfig,
    platform::Platform,
};

pub const ENV_PREFIX: &str = "TRAVEL";
pub const API_KEY_FALLBACK_ENV: &str = "RAPIDAPI_KEY";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub http: HttpConfig,
    pub platforms: PlatformsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: concat!("travel-aggregator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Unset fields fall back to the provider's built-in defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub base_url: Option<String>,
    pub min_interval_ms: Option<u64>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            host: None,
            base_url: None,
            min_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub booking: PlatformConfig,
    pub airbnb: PlatformConfig,
    pub skyscanner: PlatformConfig,
    pub tripadvisor: PlatformConfig,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Booking => &self.booking,
            Platform::Airbnb => &self.airbnb,
            Platform::Skyscanner => &self.skyscanner,
            Platform::TripAdvisor => &self.tripadvisor,
        }
    }

    fn get_mut(&mut self, platform: Platform) -> &mut PlatformConfig {
        match platform {
            Platform::Booking => &mut self.booking,
            Platform::Airbnb => &mut self.airbnb,
            Platform::Skyscanner => &mut self.skyscanner,
            Platform::TripAdvisor => &mut self.tripadvisor,
        }
    }

    pub fn enabled(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.get(*p).enabled)
            .collect()
    }

    /// Fills every missing per-platform key with the shared RapidAPI key.
    pub fn fill_missing_keys(&mut self, fallback: Option<String>) {
        let Some(fallback) = fallback.filter(|k| !k.trim().is_empty()) else {
            return;
        };
        for platform in Platform::ALL {
            let config = self.get_mut(platform);
            if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                config.api_key = Some(fallback.clone());
            }
        }
    }

    pub fn host(&self, platform: Platform) -> String {
        self.get(platform)
            .host
            .clone()
            .unwrap_or_else(|| default_host(platform).to_string())
    }

    pub fn min_interval(&self, platform: Platform) -> Duration {
        Duration::from_millis(
            self.get(platform)
                .min_interval_ms
                .unwrap_or_else(|| default_min_interval_ms(platform)),
        )
    }

    pub fn adapter_config(&self, platform: Platform, http: &HttpConfig) -> AdapterConfig {
        let config = self.get(platform);
        let mut adapter = AdapterConfig::rapidapi(
            self.host(platform),
            config.api_key.clone().unwrap_or_default(),
        )
        .with_timeout(http.timeout());
        if let Some(base_url) = &config.base_url {
            adapter = adapter.with_base_url(base_url.clone());
        }
        adapter
    }
}

pub fn default_host(platform: Platform) -> &'static str {
    match platform {
        Platform::Booking => booking::HOST,
        Platform::Airbnb => airbnb::HOST,
        Platform::Skyscanner => skyscanner::HOST,
        Platform::TripAdvisor => tripadvisor::HOST,
    }
}

// Spacing that keeps each provider inside its RapidAPI plan quota
pub fn default_min_interval_ms(platform: Platform) -> u64 {
    match platform {
        Platform::Booking => 1000,
        Platform::Airbnb => 1000,
        Platform::Skyscanner => 1500,
        Platform::TripAdvisor => 1200,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Layers `.env`, `config/default`, `config/local` and `TRAVEL__*` variables, in that order.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;
        app.platforms
            .fill_missing_keys(std::env::var(API_KEY_FALLBACK_ENV).ok());
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), TravelError> {
        if self.cache.max_entries == 0 {
            return Err(TravelError::Config("cache.max_entries must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(TravelError::Config(format!(
                "retry.jitter_factor must be within 0..=1, got {}",
                self.retry.jitter_factor
            )));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(TravelError::Config(format!(
                "retry.backoff_multiplier must be >= 1, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(TravelError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(TravelError::Config(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.platforms.enabled().is_empty() {
            return Err(TravelError::Config("no platform is enabled".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.platforms.enabled(), Platform::ALL.to_vec());
        assert_eq!(config.platforms.host(Platform::Booking), "booking-com15.p.rapidapi.com");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = from_toml(
            r#"
            [retry]
            max_retries = 5

            [platforms.skyscanner]
            enabled = false

            [platforms.booking]
            api_key = "booking-key"
            min_interval_ms = 250
            base_url = "http://localhost:9000"

            [logging]
            format = "json"
            "#,
        );

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.cache.max_entries, CacheConfig::default().max_entries);
        assert!(!config.platforms.enabled().contains(&Platform::Skyscanner));
        assert_eq!(config.platforms.min_interval(Platform::Booking), Duration::from_millis(250));
        assert_eq!(config.platforms.min_interval(Platform::Airbnb), Duration::from_millis(1000));
        assert_eq!(config.logging.format, LogFormat::Json);

        let adapter = config.platforms.adapter_config(Platform::Booking, &config.http);
        assert_eq!(adapter.base_url, "http://localhost:9000");
        assert_eq!(adapter.host, "booking-com15.p.rapidapi.com");
        assert_eq!(adapter.api_key, "booking-key");
    }

    #[test]
    fn test_shared_key_fills_only_missing_keys() {
        let mut platforms = PlatformsConfig::default();
        platforms.airbnb.api_key = Some("airbnb-key".into());
        platforms.fill_missing_keys(Some("shared".into()));

        assert_eq!(platforms.airbnb.api_key.as_deref(), Some("airbnb-key"));
        assert_eq!(platforms.booking.api_key.as_deref(), Some("shared"));
        assert_eq!(platforms.tripadvisor.api_key.as_deref(), Some("shared"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.retry.jitter_factor = 1.5;
        assert!(matches!(config.validate(), Err(TravelError::Config(_))));

        let mut config = AppConfig::default();
        for platform in Platform::ALL {
            config.platforms.get_mut(platform).enabled = false;
        }
        assert!(config.validate().unwrap_err().to_string().contains("no platform"));
    }
}
