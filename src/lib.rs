// Main library file for the travel inventory aggregator
pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod error_handler;
pub mod http;
pub mod logging;
pub mod models;
pub mod platform;
pub mod rate_limiter;
pub mod service;
pub mod travel_cache;

// Re-export key types for convenience
pub use adapters::{AdapterConfig, PlatformAdapter};
pub use cache::{CacheConfig, CacheManager, CacheStats, SetOptions};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::AppConfig;
pub use error::{Result, TravelError};
pub use error_handler::{ErrorCategory, ErrorHandler, RetryConfig, RetryOptions};
pub use models::{
    BestDeals, DetailsRequest, NormalizedFlight, NormalizedListing, PriceComparison,
    SearchRequest, SearchResult,
};
pub use platform::{Platform, PlatformSelector};
pub use rate_limiter::RateLimiter;
pub use service::{ServiceHealth, TravelService};
pub use travel_cache::TravelCache;
