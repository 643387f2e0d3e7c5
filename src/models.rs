use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{Result, TravelError},
    platform::{Platform, PlatformSelector},
};

fn default_guests() -> u32 {
    1
}

/// Body accepted by route handlers: `{destination, checkin, checkout, guests, platform}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub destination: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    #[serde(default = "default_guests")]
    pub guests: u32,
    #[serde(default)]
    pub platform: PlatformSelector,
    /// Departure city for flight searches; providers fall back to their default origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl SearchRequest {
    pub fn new(destination: impl Into<String>, checkin: NaiveDate, checkout: NaiveDate) -> Self {
        Self {
            destination: destination.into(),
            checkin,
            checkout,
            guests: 1,
            platform: PlatformSelector::All,
            origin: None,
        }
    }

    pub fn with_guests(mut self, guests: u32) -> Self {
        self.guests = guests;
        self
    }

    pub fn with_platform(mut self, platform: PlatformSelector) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(TravelError::InvalidRequest(
                "destination is required".to_string(),
            ));
        }
        if self.checkout <= self.checkin {
            return Err(TravelError::InvalidRequest(format!(
                "checkout {} must be after checkin {}",
                self.checkout, self.checkin
            )));
        }
        if self.guests == 0 {
            return Err(TravelError::InvalidRequest(
                "at least one guest is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    /// Parameters that identify the query for caching, independent of the selector.
    pub fn cache_params(&self) -> serde_json::Value {
        json!({
            "destination": self.destination.trim().to_lowercase(),
            "checkin": self.checkin,
            "checkout": self.checkout,
            "guests": self.guests,
            "origin": self.origin.as_deref().map(|o| o.trim().to_lowercase()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingCategory {
    Hotels,
    Flights,
    Activities,
}

impl ListingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCategory::Hotels => "hotels",
            ListingCategory::Flights => "flights",
            ListingCategory::Activities => "activities",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Hotel,
    Activity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub id: String,
    pub platform: Platform,
    pub kind: ListingKind,
    pub name: String,
    pub price: f64,
    pub currency: String,
    /// Always on a 0-5 scale regardless of the provider's own scale.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub location: Location,
    pub amenities: Vec<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFlight {
    pub id: String,
    pub platform: Platform,
    pub airline: String,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub duration_minutes: u32,
    pub stops: u32,
    pub price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelDetails {
    pub listing: NormalizedListing,
    pub description: Option<String>,
    pub check_in_time: Option<String>,
    pub check_out_time: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsRequest {
    pub hotel_id: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    #[serde(default = "default_guests")]
    pub guests: u32,
}

impl DetailsRequest {
    pub fn new(hotel_id: impl Into<String>, checkin: NaiveDate, checkout: NaiveDate) -> Self {
        Self {
            hotel_id: hotel_id.into(),
            checkin,
            checkout,
            guests: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub platform: Platform,
    pub hotel_id: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub available: bool,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub rooms_left: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub platform: Platform,
    pub healthy: bool,
    pub latency_ms: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFailure {
    pub platform: Platform,
    pub message: String,
}

/// Listings gathered from a single platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformResults {
    pub hotels: Vec<NormalizedListing>,
    pub flights: Vec<NormalizedFlight>,
    pub activities: Vec<NormalizedListing>,
}

impl PlatformResults {
    pub fn is_empty(&self) -> bool {
        self.hotels.is_empty() && self.flights.is_empty() && self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hotels.len() + self.flights.len() + self.activities.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hotels: Vec<NormalizedListing>,
    pub flights: Vec<NormalizedFlight>,
    pub activities: Vec<NormalizedListing>,
    pub errors: Vec<PlatformFailure>,
    pub platforms: Vec<Platform>,
    pub searched_at: DateTime<Utc>,
}

impl SearchResult {
    pub fn empty(platforms: Vec<Platform>) -> Self {
        Self {
            hotels: vec![],
            flights: vec![],
            activities: vec![],
            errors: vec![],
            platforms,
            searched_at: Utc::now(),
        }
    }

    pub fn merge(&mut self, results: PlatformResults) {
        self.hotels.extend(results.hotels);
        self.flights.extend(results.flights);
        self.activities.extend(results.activities);
    }

    pub fn total_listings(&self) -> usize {
        self.hotels.len() + self.flights.len() + self.activities.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestDeals {
    pub hotels: Vec<NormalizedListing>,
    pub flights: Vec<NormalizedFlight>,
    pub activities: Vec<NormalizedListing>,
    pub errors: Vec<PlatformFailure>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformPriceSummary {
    pub hotel_count: usize,
    pub flight_count: usize,
    pub activity_count: usize,
    pub cheapest_hotel: Option<NormalizedListing>,
    pub cheapest_flight: Option<NormalizedFlight>,
    pub cheapest_activity: Option<NormalizedListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComparison {
    pub destination: String,
    pub by_platform: BTreeMap<Platform, PlatformPriceSummary>,
    pub overall: PlatformPriceSummary,
    pub errors: Vec<PlatformFailure>,
}

pub fn by_price_listing(a: &NormalizedListing, b: &NormalizedListing) -> Ordering {
    a.price.total_cmp(&b.price)
}

pub fn by_price_flight(a: &NormalizedFlight, b: &NormalizedFlight) -> Ordering {
    a.price.total_cmp(&b.price)
}

/// Highest rating first; unrated listings sort last.
pub fn by_rating_desc(a: &NormalizedListing, b: &NormalizedListing) -> Ordering {
    match (a.rating, b.rating) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn summarize<'a>(
    hotels: impl Iterator<Item = &'a NormalizedListing>,
    flights: impl Iterator<Item = &'a NormalizedFlight>,
    activities: impl Iterator<Item = &'a NormalizedListing>,
) -> PlatformPriceSummary {
    let hotels: Vec<_> = hotels.collect();
    let flights: Vec<_> = flights.collect();
    let activities: Vec<_> = activities.collect();

    PlatformPriceSummary {
        hotel_count: hotels.len(),
        flight_count: flights.len(),
        activity_count: activities.len(),
        cheapest_hotel: hotels
            .iter()
            .min_by(|a, b| by_price_listing(a, b))
            .map(|l| (*l).clone()),
        cheapest_flight: flights
            .iter()
            .min_by(|a, b| by_price_flight(a, b))
            .map(|f| (*f).clone()),
        cheapest_activity: activities
            .iter()
            .min_by(|a, b| by_price_listing(a, b))
            .map(|l| (*l).clone()),
    }
}
