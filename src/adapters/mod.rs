pub mod airbnb;
pub mod booking;
pub mod skyscanner;
pub mod tripadvisor;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    error::{Result, TravelError},
    http::{HttpClient, DEFAULT_TIMEOUT},
    models::{
        AdapterHealth, Availability, DetailsRequest, HotelDetails, ListingCategory,
        NormalizedFlight, NormalizedListing, SearchRequest,
    },
    platform::Platform,
};

pub use airbnb::AirbnbAdapter;
pub use booking::BookingAdapter;
pub use skyscanner::SkyscannerAdapter;
pub use tripadvisor::TripAdvisorAdapter;

/// Common contract for every provider. Methods a provider cannot serve keep the default
/// body and fail with [`TravelError::NotSupported`].
#[async_trait]
pub trait PlatformAdapter: Send + Sync + fmt::Debug {
    fn platform(&self) -> Platform;

    /// Categories the fan-out search should request from this provider.
    fn capabilities(&self) -> &'static [ListingCategory];

    async fn search_hotels(&self, request: &SearchRequest) -> Result<Vec<NormalizedListing>>;

    async fn get_hotel_details(&self, _request: &DetailsRequest) -> Result<HotelDetails> {
        Err(TravelError::not_supported(self.platform(), "get_hotel_details"))
    }

    async fn check_availability(&self, _request: &DetailsRequest) -> Result<Availability> {
        Err(TravelError::not_supported(self.platform(), "check_availability"))
    }

    async fn search_flights(&self, _request: &SearchRequest) -> Result<Vec<NormalizedFlight>> {
        Err(TravelError::not_supported(self.platform(), "search_flights"))
    }

    async fn search_activities(&self, _request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        Err(TravelError::not_supported(self.platform(), "search_activities"))
    }

    async fn health_check(&self) -> AdapterHealth;
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub base_url: String,
    pub api_key: String,
    pub host: String,
    pub timeout: Duration,
}

impl AdapterConfig {
    /// Standard RapidAPI layout: the base URL is derived from the host header.
    pub fn rapidapi(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            base_url: format!("https://{host}"),
            api_key: api_key.into(),
            host,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Authenticated GET shared by all adapters.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    platform: Platform,
    config: AdapterConfig,
    http: Arc<dyn HttpClient>,
}

impl ProviderClient {
    pub fn new(platform: Platform, config: AdapterConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            platform,
            config,
            http,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path);
        let headers = [
            ("X-RapidAPI-Key", self.config.api_key.as_str()),
            ("X-RapidAPI-Host", self.config.host.as_str()),
        ];

        debug!(platform = %self.platform, %url, "provider request");
        let body = self
            .http
            .get_json(&url, &headers, query, self.config.timeout)
            .await
            .map_err(|e| TravelError::from_http(self.platform, e))?;

        check_envelope(self.platform, body)
    }

    /// Cheap request used for health reporting. Never fails.
    pub async fn probe(&self, path: &str, query: &[(&str, String)]) -> AdapterHealth {
        let started = Instant::now();
        let outcome = self.get(path, query).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(_) => AdapterHealth {
                platform: self.platform,
                healthy: true,
                latency_ms,
                message: None,
            },
            Err(e) => AdapterHealth {
                platform: self.platform,
                healthy: false,
                latency_ms,
                message: Some(e.to_string()),
            },
        }
    }
}

/// RapidAPI providers answer 200 with `{"status": false, "message": ...}` on logical errors.
fn check_envelope(platform: Platform, body: Value) -> Result<Value> {
    if body.get("status").and_then(Value::as_bool) != Some(false) {
        return Ok(body);
    }

    let message = match body.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "request failed".to_string(),
        Some(other) => other.to_string(),
    };
    Err(TravelError::provider(platform, message))
}

/// Static destination lookup with a fixed fallback.
#[derive(Debug, Clone, Copy)]
pub struct DestinationTable<T: 'static> {
    entries: &'static [(&'static str, T)],
    default: T,
}

impl<T: Copy + 'static> DestinationTable<T> {
    pub const fn new(entries: &'static [(&'static str, T)], default: T) -> Self {
        Self { entries, default }
    }

    pub fn lookup(&self, destination: &str) -> Option<T> {
        let normalized = destination.trim().to_lowercase();
        let city = normalized.split(',').next().unwrap_or("").trim();
        self.entries
            .iter()
            .find(|(name, _)| *name == normalized || *name == city)
            .map(|(_, id)| *id)
    }

    /// Unknown destinations resolve to the default entry.
    pub fn resolve(&self, destination: &str) -> T {
        self.lookup(destination).unwrap_or(self.default)
    }
}

/// Reads a number or a formatted price string such as `"$1,234.50"`.
pub fn parse_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .filter(|c| *c != ',')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Reads a count that may arrive as a number or as `"1,234"`.
pub fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(_) => parse_price(value).map(|n| n as u32),
        _ => None,
    }
}

/// Maps a rating on `0..=scale` onto the shared 0-5 scale.
pub fn scale_rating(raw: f64, scale: f64) -> Option<f64> {
    if !raw.is_finite() || scale <= 0.0 || raw <= 0.0 {
        return None;
    }
    let scaled = (raw * 5.0 / scale).clamp(0.0, 5.0);
    Some((scaled * 100.0).round() / 100.0)
}

pub fn text(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn number(value: &Value, pointer: &str) -> Option<f64> {
    value.pointer(pointer).and_then(parse_price)
}

pub fn array<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw.trim(), format).ok())
}

/// Accepts RFC 3339 or a naive local timestamp, which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn adult_count(guests: u32) -> String {
    guests.max(1).to_string()
}
