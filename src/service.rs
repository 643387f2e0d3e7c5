use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    adapters::{
        AirbnbAdapter, BookingAdapter, PlatformAdapter, SkyscannerAdapter, TripAdvisorAdapter,
    },
    cache::{CacheManager, CacheStats},
    circuit_breaker::{CircuitBreakerStatus, CircuitState},
    config::AppConfig,
    error::{Result, TravelError},
    error_handler::{ErrorHandler, RetryOptions},
    http::{HttpClient, ReqwestHttpClient},
    models::{
        by_price_flight, by_price_listing, by_rating_desc, summarize, AdapterHealth,
        Availability, BestDeals, DetailsRequest, HotelDetails, ListingCategory, PlatformFailure,
        PlatformResults, PriceComparison, SearchRequest, SearchResult,
    },
    platform::{Platform, PlatformSelector},
    rate_limiter::{RateLimitStats, RateLimiter},
    travel_cache::{CacheClass, TravelCache},
};

pub type AdapterRegistry = BTreeMap<Platform, Arc<dyn PlatformAdapter>>;

pub const BEST_DEALS_LIMIT: usize = 10;
const BEST_DEALS_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a normalized search result stays fresh, per category.
pub fn category_ttl(category: ListingCategory) -> Duration {
    Duration::from_secs(match category {
        ListingCategory::Hotels => 10 * 60,
        ListingCategory::Flights => 5 * 60,
        ListingCategory::Activities => 30 * 60,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: OverallStatus,
    pub adapters: BTreeMap<Platform, AdapterHealth>,
    pub circuit_breakers: BTreeMap<Platform, CircuitBreakerStatus>,
    pub rate_limits: BTreeMap<Platform, RateLimitStats>,
    pub cache: CacheStats,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TravelService {
    adapters: AdapterRegistry,
    cache: TravelCache,
    rate_limiter: Arc<RateLimiter>,
    errors: Arc<ErrorHandler>,
}

impl TravelService {
    pub fn new(
        adapters: AdapterRegistry,
        cache: Arc<CacheManager>,
        rate_limiter: Arc<RateLimiter>,
        errors: Arc<ErrorHandler>,
    ) -> Self {
        Self {
            adapters,
            cache: TravelCache::new(cache),
            rate_limiter,
            errors,
        }
    }

    /// Composition root: builds every component from configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;

        let client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .user_agent(config.http.user_agent.clone())
            .build()
            .context("building HTTP client")?;
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_client(client));

        let rate_limiter = Arc::new(RateLimiter::new());
        let mut adapters = AdapterRegistry::new();

        for platform in config.platforms.enabled() {
            if config
                .platforms
                .get(platform)
                .api_key
                .as_deref()
                .map_or(true, str::is_empty)
            {
                warn!(platform = %platform, "no API key configured, requests will be rejected");
            }

            if config.rate_limits.enabled {
                rate_limiter.initialize_platform(platform, config.platforms.min_interval(platform));
            }

            let adapter_config = config.platforms.adapter_config(platform, &config.http);
            let http = Arc::clone(&http);
            let adapter: Arc<dyn PlatformAdapter> = match platform {
                Platform::Booking => Arc::new(BookingAdapter::new(adapter_config, http)),
                Platform::Airbnb => Arc::new(AirbnbAdapter::new(adapter_config, http)),
                Platform::Skyscanner => Arc::new(SkyscannerAdapter::new(adapter_config, http)),
                Platform::TripAdvisor => Arc::new(TripAdvisorAdapter::new(adapter_config, http)),
            };
            adapters.insert(platform, adapter);
        }

        info!(
            platforms = ?adapters.keys().collect::<Vec<_>>(),
            "travel service configured"
        );

        Ok(Self::new(
            adapters,
            Arc::new(CacheManager::new(config.cache.clone())),
            rate_limiter,
            Arc::new(ErrorHandler::new(
                config.retry.clone(),
                config.circuit_breaker.clone(),
            )),
        ))
    }

    /// Starts the periodic cache sweep. Requires a running tokio runtime.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.cache.manager().start_sweeper()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn cache(&self) -> &TravelCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    fn adapter(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).ok_or_else(|| {
            TravelError::InvalidRequest(format!("no adapter registered for {platform}"))
        })
    }

    fn resolve(&self, selector: PlatformSelector) -> Result<Vec<Platform>> {
        match selector {
            PlatformSelector::All => Ok(self.platforms()),
            PlatformSelector::Only(platform) => self.adapter(platform).map(|_| vec![platform]),
        }
    }

    /// Searches every selected platform concurrently. Platform failures are reported in
    /// `errors` and never fail the whole search.
    pub async fn search_all_platforms(&self, request: &SearchRequest) -> Result<SearchResult> {
        request.validate()?;
        let platforms = self.resolve(request.platform)?;

        let outcomes = join_all(platforms.iter().map(|platform| async move {
            (*platform, self.search_platform(*platform, request).await)
        }))
        .await;

        let mut result = SearchResult::empty(platforms);
        for (platform, outcome) in outcomes {
            match outcome {
                Ok(results) => result.merge(results),
                Err(e) => {
                    warn!(platform = %platform, error = %e, "platform search failed");
                    result.errors.push(PlatformFailure {
                        platform,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            destination = %request.destination,
            listings = result.total_listings(),
            failed = result.errors.len(),
            "search completed"
        );
        Ok(result)
    }

    /// Searches one platform for every category it supports; the first failing category
    /// fails the platform.
    pub async fn search_platform(
        &self,
        platform: Platform,
        request: &SearchRequest,
    ) -> Result<PlatformResults> {
        let adapter: &dyn PlatformAdapter = self.adapter(platform)?.as_ref();
        let limiter: &RateLimiter = &self.rate_limiter;
        let mut results = PlatformResults::default();

        for category in adapter.capabilities() {
            match category {
                ListingCategory::Hotels => {
                    results.hotels = self
                        .cached_search(platform, *category, request, move || async move {
                            limiter.enforce_rate_limit(platform).await;
                            adapter.search_hotels(request).await
                        })
                        .await?;
                }
                ListingCategory::Flights => {
                    results.flights = self
                        .cached_search(platform, *category, request, move || async move {
                            limiter.enforce_rate_limit(platform).await;
                            adapter.search_flights(request).await
                        })
                        .await?;
                }
                ListingCategory::Activities => {
                    results.activities = self
                        .cached_search(platform, *category, request, move || async move {
                            limiter.enforce_rate_limit(platform).await;
                            adapter.search_activities(request).await
                        })
                        .await?;
                }
            }
        }

        Ok(results)
    }

    async fn cached_search<T, F, Fut>(
        &self,
        platform: Platform,
        category: ListingCategory,
        request: &SearchRequest,
        call: F,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let params = json!({
            "platform": platform,
            "category": category,
            "query": request.cache_params(),
        });

        if let Some(hit) = self.cache.get_search_results::<Vec<T>>(&params) {
            debug!(platform = %platform, category = category.as_str(), "search cache hit");
            return Ok(hit);
        }

        let items = self
            .errors
            .execute_with_retry(
                call,
                RetryOptions::new(platform).with_context(format!("search_{}", category.as_str())),
            )
            .await?;

        self.cache
            .put_with_ttl(CacheClass::SearchResults, &params, &items, category_ttl(category));
        Ok(items)
    }

    /// Cheapest hotels and flights and best-rated activities, at most ten of each.
    pub async fn get_best_deals(&self, request: &SearchRequest) -> Result<BestDeals> {
        let params = json!({
            "kind": "best_deals",
            "platform": request.platform,
            "query": request.cache_params(),
        });
        if let Some(hit) = self.cache.get_search_results::<BestDeals>(&params) {
            debug!(destination = %request.destination, "best deals cache hit");
            return Ok(hit);
        }

        let SearchResult {
            mut hotels,
            mut flights,
            mut activities,
            errors,
            ..
        } = self.search_all_platforms(request).await?;

        hotels.sort_by(by_price_listing);
        hotels.truncate(BEST_DEALS_LIMIT);
        flights.sort_by(by_price_flight);
        flights.truncate(BEST_DEALS_LIMIT);
        activities.sort_by(by_rating_desc);
        activities.truncate(BEST_DEALS_LIMIT);

        let deals = BestDeals {
            hotels,
            flights,
            activities,
            errors,
            generated_at: Utc::now(),
        };
        self.cache
            .put_with_ttl(CacheClass::SearchResults, &params, &deals, BEST_DEALS_TTL);
        Ok(deals)
    }

    pub async fn compare_prices(&self, request: &SearchRequest) -> Result<PriceComparison> {
        let result = self.search_all_platforms(request).await?;

        let failed: Vec<Platform> = result.errors.iter().map(|e| e.platform).collect();
        let by_platform = result
            .platforms
            .iter()
            .filter(|p| !failed.contains(p))
            .map(|&platform| {
                let summary = summarize(
                    result.hotels.iter().filter(|h| h.platform == platform),
                    result.flights.iter().filter(|f| f.platform == platform),
                    result.activities.iter().filter(|a| a.platform == platform),
                );
                (platform, summary)
            })
            .collect();

        Ok(PriceComparison {
            destination: request.destination.clone(),
            by_platform,
            overall: summarize(
                result.hotels.iter(),
                result.flights.iter(),
                result.activities.iter(),
            ),
            errors: result.errors,
        })
    }

    pub async fn get_hotel_details(
        &self,
        platform: Platform,
        request: &DetailsRequest,
    ) -> Result<HotelDetails> {
        if let Some(hit) = self.cache.get_hotel_details(platform, request) {
            debug!(platform = %platform, hotel_id = %request.hotel_id, "hotel details cache hit");
            return Ok(hit);
        }

        let adapter: &dyn PlatformAdapter = self.adapter(platform)?.as_ref();
        let limiter: &RateLimiter = &self.rate_limiter;
        let details = self
            .errors
            .execute_with_retry(
                move || async move {
                    limiter.enforce_rate_limit(platform).await;
                    adapter.get_hotel_details(request).await
                },
                RetryOptions::new(platform).with_context("get_hotel_details"),
            )
            .await?;

        self.cache
            .cache_hotel_details(platform, request, &details);
        Ok(details)
    }

    pub async fn check_availability(
        &self,
        platform: Platform,
        request: &DetailsRequest,
    ) -> Result<Availability> {
        let adapter: &dyn PlatformAdapter = self.adapter(platform)?.as_ref();
        let limiter: &RateLimiter = &self.rate_limiter;
        self.errors
            .execute_with_retry(
                move || async move {
                    limiter.enforce_rate_limit(platform).await;
                    adapter.check_availability(request).await
                },
                RetryOptions::new(platform).with_context("check_availability"),
            )
            .await
    }

    /// Healthy only when every adapter answers and no circuit is open.
    pub async fn health_check(&self) -> ServiceHealth {
        let adapters: BTreeMap<Platform, AdapterHealth> =
            join_all(self.adapters.iter().map(|(platform, adapter)| async move {
                (*platform, adapter.health_check().await)
            }))
            .await
            .into_iter()
            .collect();

        let circuit_breakers = self.errors.all_circuit_breaker_statuses();
        let any_open = circuit_breakers
            .values()
            .any(|s| s.state == CircuitState::Open);
        let all_healthy = adapters.values().all(|h| h.healthy);

        let status = if all_healthy && !any_open {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };
        if status == OverallStatus::Degraded {
            warn!(
                unhealthy = adapters.values().filter(|h| !h.healthy).count(),
                open_circuits = any_open,
                "service degraded"
            );
        }

        ServiceHealth {
            status,
            adapters,
            circuit_breakers,
            rate_limits: self.rate_limiter.stats(),
            cache: self.cache.manager().stats(),
            checked_at: Utc::now(),
        }
    }
}
