use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::{
    cache::{generate_key, CacheManager, SetOptions},
    models::DetailsRequest,
    platform::Platform,
};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
    SearchResults,
    HotelDetails,
    FlightDetails,
    UserPreferences,
    PlatformResponse,
    Geolocation,
    CurrencyRate,
    BookingRecord,
}

impl CacheClass {
    pub fn namespace(&self) -> &'static str {
        match self {
            CacheClass::SearchResults => "search",
            CacheClass::HotelDetails => "hotel",
            CacheClass::FlightDetails => "flight",
            CacheClass::UserPreferences => "user",
            CacheClass::PlatformResponse => "platform",
            CacheClass::Geolocation => "geo",
            CacheClass::CurrencyRate => "currency",
            CacheClass::BookingRecord => "booking",
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(match self {
            CacheClass::SearchResults => 15 * MINUTE,
            CacheClass::HotelDetails => HOUR,
            CacheClass::FlightDetails => 10 * MINUTE,
            CacheClass::UserPreferences => 7 * DAY,
            CacheClass::PlatformResponse => 5 * MINUTE,
            CacheClass::Geolocation => DAY,
            CacheClass::CurrencyRate => HOUR,
            CacheClass::BookingRecord => 30 * DAY,
        })
    }

    // Large, rarely read payloads are worth compressing
    fn compress(&self) -> bool {
        matches!(
            self,
            CacheClass::PlatformResponse | CacheClass::BookingRecord
        )
    }
}

#[derive(Debug, Clone)]
pub struct TravelCache {
    cache: Arc<CacheManager>,
}

impl TravelCache {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn key<P: Serialize + ?Sized>(class: CacheClass, params: &P) -> String {
        generate_key(class.namespace(), params)
    }

    pub fn put<P, T>(&self, class: CacheClass, params: &P, value: &T) -> bool
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.put_with_ttl(class, params, value, class.default_ttl())
    }

    pub fn put_with_ttl<P, T>(&self, class: CacheClass, params: &P, value: &T, ttl: Duration) -> bool
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let mut options = SetOptions::ttl(ttl).with_namespace(class.namespace());
        if class.compress() {
            options = options.compressed();
        }
        self.cache.set(&Self::key(class, params), value, options)
    }

    pub fn fetch<P, T>(&self, class: CacheClass, params: &P) -> Option<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.cache.get(&Self::key(class, params))
    }

    pub fn invalidate_class(&self, class: CacheClass) -> usize {
        self.cache.clear(Some(class.namespace()))
    }

    pub fn cache_search_results<T: Serialize>(&self, params: &Value, results: &T) -> bool {
        self.put(CacheClass::SearchResults, params, results)
    }

    pub fn get_search_results<T: DeserializeOwned>(&self, params: &Value) -> Option<T> {
        self.fetch(CacheClass::SearchResults, params)
    }

    pub fn cache_hotel_details<T: Serialize>(
        &self,
        platform: Platform,
        request: &DetailsRequest,
        details: &T,
    ) -> bool {
        self.put(CacheClass::HotelDetails, &hotel_params(platform, request), details)
    }

    pub fn get_hotel_details<T: DeserializeOwned>(
        &self,
        platform: Platform,
        request: &DetailsRequest,
    ) -> Option<T> {
        self.fetch(CacheClass::HotelDetails, &hotel_params(platform, request))
    }

    pub fn cache_flight_details<T: Serialize>(&self, platform: Platform, flight_id: &str, details: &T) -> bool {
        self.put(
            CacheClass::FlightDetails,
            &json!({"platform": platform, "flight_id": flight_id}),
            details,
        )
    }

    pub fn get_flight_details<T: DeserializeOwned>(&self, platform: Platform, flight_id: &str) -> Option<T> {
        self.fetch(
            CacheClass::FlightDetails,
            &json!({"platform": platform, "flight_id": flight_id}),
        )
    }

    pub fn cache_user_preferences<T: Serialize>(&self, user_id: &str, preferences: &T) -> bool {
        self.put(CacheClass::UserPreferences, &json!({"user_id": user_id}), preferences)
    }

    pub fn get_user_preferences<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        self.fetch(CacheClass::UserPreferences, &json!({"user_id": user_id}))
    }

    pub fn cache_platform_response(
        &self,
        platform: Platform,
        endpoint: &str,
        params: &Value,
        response: &Value,
    ) -> bool {
        self.put(
            CacheClass::PlatformResponse,
            &json!({"platform": platform, "endpoint": endpoint, "params": params}),
            response,
        )
    }

    pub fn get_platform_response(&self, platform: Platform, endpoint: &str, params: &Value) -> Option<Value> {
        self.fetch(
            CacheClass::PlatformResponse,
            &json!({"platform": platform, "endpoint": endpoint, "params": params}),
        )
    }

    pub fn cache_geolocation<T: Serialize>(&self, query: &str, location: &T) -> bool {
        self.put(CacheClass::Geolocation, &geo_params(query), location)
    }

    pub fn get_geolocation<T: DeserializeOwned>(&self, query: &str) -> Option<T> {
        self.fetch(CacheClass::Geolocation, &geo_params(query))
    }

    pub fn cache_currency_rate(&self, from: &str, to: &str, rate: f64) -> bool {
        self.put(CacheClass::CurrencyRate, &currency_params(from, to), &rate)
    }

    pub fn get_currency_rate(&self, from: &str, to: &str) -> Option<f64> {
        self.fetch(CacheClass::CurrencyRate, &currency_params(from, to))
    }

    pub fn cache_booking<T: Serialize>(&self, booking_id: &str, record: &T) -> bool {
        self.put(CacheClass::BookingRecord, &json!({"booking_id": booking_id}), record)
    }

    pub fn get_booking<T: DeserializeOwned>(&self, booking_id: &str) -> Option<T> {
        self.fetch(CacheClass::BookingRecord, &json!({"booking_id": booking_id}))
    }
}

// prices in the details depend on the stay, not just the hotel
fn hotel_params(platform: Platform, request: &DetailsRequest) -> Value {
    json!({"platform": platform, "request": request})
}

fn geo_params(query: &str) -> Value {
    json!({"query": query.trim().to_lowercase()})
}

fn currency_params(from: &str, to: &str) -> Value {
    json!({"from": from.to_uppercase(), "to": to.to_uppercase()})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use chrono::NaiveDate;
    use serde::Deserialize;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn travel_cache() -> TravelCache {
        TravelCache::new(Arc::new(CacheManager::new(CacheConfig::default())))
    }

    #[test]
    fn test_default_ttls_follow_volatility() {
        assert_eq!(CacheClass::CurrencyRate.default_ttl(), Duration::from_secs(3600));
        assert_eq!(CacheClass::Geolocation.default_ttl(), Duration::from_secs(86_400));
        assert_eq!(CacheClass::BookingRecord.default_ttl(), Duration::from_secs(30 * 86_400));
        assert!(CacheClass::PlatformResponse.default_ttl() < CacheClass::HotelDetails.default_ttl());
    }

    #[test]
    fn test_wrappers_use_their_namespace() {
        let cache = travel_cache();
        assert!(cache.cache_currency_rate("usd", "eur", 0.92));
        assert!(cache.cache_geolocation("Paris", &(48.8566, 2.3522)));
        let stay = DetailsRequest::new("h-1", date(5, 1), date(5, 3));
        assert!(cache.cache_hotel_details(Platform::Booking, &stay, &json!({"name": "Le Grand"})));

        assert_eq!(cache.get_currency_rate("USD", "EUR"), Some(0.92));
        assert_eq!(cache.get_geolocation::<(f64, f64)>(" paris "), Some((48.8566, 2.3522)));
        assert!(cache.get_hotel_details::<Value>(Platform::Airbnb, &stay).is_none());

        let stats = cache.manager().stats();
        assert_eq!(stats.namespaces.get("currency"), Some(&1));
        assert_eq!(stats.namespaces.get("geo"), Some(&1));
        assert_eq!(stats.namespaces.get("hotel"), Some(&1));

        assert_eq!(cache.invalidate_class(CacheClass::Geolocation), 1);
        assert!(cache.get_geolocation::<(f64, f64)>("paris").is_none());
    }

    #[test]
    fn test_hotel_details_are_keyed_by_stay() {
        let cache = travel_cache();
        let may = DetailsRequest::new("h-1", date(5, 1), date(5, 3));
        let mut december = DetailsRequest::new("h-1", date(12, 20), date(12, 27));
        december.guests = 4;

        assert!(cache.cache_hotel_details(Platform::Booking, &may, &json!({"price": 180.0})));

        assert_eq!(
            cache.get_hotel_details::<Value>(Platform::Booking, &may),
            Some(json!({"price": 180.0}))
        );
        assert!(cache.get_hotel_details::<Value>(Platform::Booking, &december).is_none());

        let mut more_guests = may.clone();
        more_guests.guests = 2;
        assert!(cache.get_hotel_details::<Value>(Platform::Booking, &more_guests).is_none());
    }

    #[test]
    fn test_booking_records_round_trip_through_compression() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct BookingRecord {
            id: String,
            nights: Vec<String>,
        }

        let cache = travel_cache();
        let record = BookingRecord {
            id: "bk-42".to_string(),
            nights: (1..=300).map(|d| format!("night-{d}")).collect(),
        };
        assert!(cache.cache_booking("bk-42", &record));
        assert_eq!(cache.get_booking::<BookingRecord>("bk-42"), Some(record));
    }

    #[test]
    fn test_platform_response_keys_include_params() {
        let cache = travel_cache();
        let params = json!({"dest_id": "-1456928", "adults": 2});
        cache.cache_platform_response(Platform::Booking, "searchHotels", &params, &json!({"ok": true}));

        let reordered = json!({"adults": 2, "dest_id": "-1456928"});
        assert_eq!(
            cache.get_platform_response(Platform::Booking, "searchHotels", &reordered),
            Some(json!({"ok": true}))
        );
        assert!(cache
            .get_platform_response(Platform::Booking, "searchHotels", &json!({"adults": 3}))
            .is_none());
    }
}
