use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    adult_count, array, number, parse_timestamp, text, AdapterConfig, DestinationTable,
    PlatformAdapter, ProviderClient,
};
use crate::{
    error::Result,
    http::HttpClient,
    models::{
        AdapterHealth, ListingCategory, NormalizedFlight, NormalizedListing, SearchRequest,
    },
    platform::Platform,
};

pub const HOST: &str = "sky-scrapper.p.rapidapi.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Place {
    sky_id: &'static str,
    entity_id: &'static str,
}

const fn place(sky_id: &'static str, entity_id: &'static str) -> Place {
    Place { sky_id, entity_id }
}

const PLACES: DestinationTable<Place> = DestinationTable::new(
    &[
        ("paris", place("PARI", "27539733")),
        ("london", place("LOND", "27544008")),
        ("new york", place("NYCA", "27537542")),
        ("tokyo", place("TYOA", "27542089")),
        ("rome", place("ROME", "27539793")),
        ("barcelona", place("BCN", "95565085")),
        ("amsterdam", place("AMS", "95565044")),
        ("dubai", place("DXBA", "27540839")),
    ],
    place("PARI", "27539733"),
);

const DEFAULT_ORIGIN: &str = "new york";
const CURRENCY: &str = "USD";

/// Flight-only provider.
#[derive(Debug, Clone)]
pub struct SkyscannerAdapter {
    client: ProviderClient,
}

impl SkyscannerAdapter {
    pub fn new(config: AdapterConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            client: ProviderClient::new(Platform::Skyscanner, config, http),
        }
    }

    fn normalize_itinerary(item: &Value) -> Option<NormalizedFlight> {
        let leg = array(item, "/legs").first()?;
        let departure = text(leg, "/departure").and_then(|raw| parse_timestamp(&raw))?;
        let arrival = text(leg, "/arrival").and_then(|raw| parse_timestamp(&raw))?;

        let duration_minutes = number(leg, "/durationInMinutes")
            .map(|m| m as u32)
            .unwrap_or_else(|| (arrival - departure).num_minutes().max(0) as u32);

        Some(NormalizedFlight {
            id: text(item, "/id")?,
            platform: Platform::Skyscanner,
            airline: array(leg, "/carriers/marketing")
                .first()
                .and_then(|c| text(c, "/name"))
                .unwrap_or_else(|| "Unknown".to_string()),
            origin: text(leg, "/origin/displayCode").unwrap_or_default(),
            destination: text(leg, "/destination/displayCode").unwrap_or_default(),
            departure,
            arrival,
            duration_minutes,
            stops: number(leg, "/stopCount").map(|s| s as u32).unwrap_or(0),
            price: number(item, "/price/raw").or_else(|| number(item, "/price/formatted"))?,
            currency: CURRENCY.to_string(),
        })
    }
}

#[async_trait]
impl PlatformAdapter for SkyscannerAdapter {
    fn platform(&self) -> Platform {
        Platform::Skyscanner
    }

    fn capabilities(&self) -> &'static [ListingCategory] {
        &[ListingCategory::Flights]
    }

    // Hotel search is not offered by this provider but answers with an empty list
    // instead of NotSupported, unlike the other unsupported calls.
    async fn search_hotels(&self, _request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        debug!(platform = %Platform::Skyscanner, "hotel search not offered, returning no listings");
        Ok(vec![])
    }

    async fn search_flights(&self, request: &SearchRequest) -> Result<Vec<NormalizedFlight>> {
        let origin = PLACES.resolve(request.origin.as_deref().unwrap_or(DEFAULT_ORIGIN));
        let destination = PLACES.resolve(&request.destination);

        let query = [
            ("originSkyId", origin.sky_id.to_string()),
            ("destinationSkyId", destination.sky_id.to_string()),
            ("originEntityId", origin.entity_id.to_string()),
            ("destinationEntityId", destination.entity_id.to_string()),
            ("date", request.checkin.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("cabinClass", "economy".to_string()),
            ("currency", CURRENCY.to_string()),
        ];
        let body = self.client.get("/api/v2/flights/searchFlights", &query).await?;

        Ok(array(&body, "/data/itineraries")
            .iter()
            .filter_map(Self::normalize_itinerary)
            .collect())
    }

    async fn health_check(&self) -> AdapterHealth {
        self.client.probe("/api/v1/checkServer", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::mock::MockHttpClient, models::DetailsRequest};
    use chrono::NaiveDate;
    use serde_json::json;

    const BASE: &str = "https://sky-scrapper.p.rapidapi.com";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn adapter(http: MockHttpClient) -> (SkyscannerAdapter, Arc<MockHttpClient>) {
        let http = Arc::new(http);
        (
            SkyscannerAdapter::new(AdapterConfig::rapidapi(HOST, "test-key"), http.clone()),
            http,
        )
    }

    #[tokio::test]
    async fn test_search_flights_normalizes_itineraries() {
        let (sky, http) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v2/flights/searchFlights"),
            json!({"status": true, "data": {"itineraries": [
                {
                    "id": "13554-2509010830--32385-0-12712-2509012145",
                    "price": {"raw": 412.37, "formatted": "$413"},
                    "legs": [{
                        "origin": {"displayCode": "LHR"},
                        "destination": {"displayCode": "JFK"},
                        "departure": "2025-09-01T08:30:00",
                        "arrival": "2025-09-01T11:45:00",
                        "durationInMinutes": 495,
                        "stopCount": 0,
                        "carriers": {"marketing": [{"name": "British Airways"}]}
                    }]
                },
                {"id": "broken", "legs": []}
            ]}}),
        ));

        let request = SearchRequest::new("New York", date(1), date(8)).with_origin("London");
        let flights = sky.search_flights(&request).await.unwrap();

        assert_eq!(flights.len(), 1);
        let flight = &flights[0];
        assert_eq!(flight.airline, "British Airways");
        assert_eq!(flight.origin, "LHR");
        assert_eq!(flight.duration_minutes, 495);
        assert_eq!(flight.price, 412.37);
        assert_eq!(flight.departure.to_rfc3339(), "2025-09-01T08:30:00+00:00");

        let query = &http.calls()[0].query;
        assert!(query.contains(&("originSkyId".to_string(), "LOND".to_string())));
        assert!(query.contains(&("destinationEntityId".to_string(), "27537542".to_string())));
        assert!(query.contains(&("date".to_string(), "2025-09-01".to_string())));
    }

    #[tokio::test]
    async fn test_hotels_are_empty_while_other_calls_are_not_supported() {
        let (sky, http) = adapter(MockHttpClient::new());
        let request = SearchRequest::new("Paris", date(1), date(3));
        let details = DetailsRequest::new("h-1", date(1), date(3));

        assert!(sky.search_hotels(&request).await.unwrap().is_empty());
        assert!(sky.search_activities(&request).await.unwrap_err().is_not_supported());
        assert!(sky.get_hotel_details(&details).await.unwrap_err().is_not_supported());
        assert!(sky.check_availability(&details).await.unwrap_err().is_not_supported());
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let (sky, _) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v1/checkServer"),
            json!({"status": true, "message": "Server is up"}),
        ));
        let health = sky.health_check().await;
        assert!(health.healthy);
        assert_eq!(health.platform, Platform::Skyscanner);
    }
}
