use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    adult_count, array, number, parse_count, parse_price, scale_rating, text, AdapterConfig,
    DestinationTable, PlatformAdapter, ProviderClient,
};
use crate::{
    error::{Result, TravelError},
    http::HttpClient,
    models::{
        AdapterHealth, Availability, DetailsRequest, HotelDetails, ListingCategory, ListingKind,
        Location, NormalizedListing, SearchRequest,
    },
    platform::Platform,
};

pub const HOST: &str = "airbnb19.p.rapidapi.com";

// Google place ids, as expected by the search endpoint
const PLACES: DestinationTable<&str> = DestinationTable::new(
    &[
        ("paris", "ChIJD7fiBh9u5kcRYJSMaMOCCwQ"),
        ("london", "ChIJdd4hrwug2EcRmSrV3Vo6llI"),
        ("new york", "ChIJOwg_06VPwokRYv534QaPC8g"),
        ("tokyo", "ChIJ51cu8IcbXWARiRtXIothAS4"),
        ("rome", "ChIJu46S-ZZhLxMROG5lkwZ3D7k"),
        ("barcelona", "ChIJ5TCOcRaYpBIRCmZHTz37sEQ"),
    ],
    "ChIJD7fiBh9u5kcRYJSMaMOCCwQ",
);

const CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct AirbnbAdapter {
    client: ProviderClient,
}

impl AirbnbAdapter {
    pub fn new(config: AdapterConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            client: ProviderClient::new(Platform::Airbnb, config, http),
        }
    }

    fn room_url(id: &str) -> String {
        format!("https://www.airbnb.com/rooms/{id}")
    }

    /// `"4.87 (312)"` carries both the rating and the review count.
    fn parse_localized_rating(raw: &str) -> (Option<f64>, Option<u32>) {
        let mut parts = raw.split_whitespace();
        let rating = parts.next().and_then(|r| r.parse::<f64>().ok());
        let reviews = parts
            .next()
            .map(|r| r.trim_matches(|c| c == '(' || c == ')'))
            .and_then(|r| r.parse::<u32>().ok());
        (rating.and_then(|r| scale_rating(r, 5.0)), reviews)
    }

    fn normalize_listing(&self, item: &Value) -> Option<NormalizedListing> {
        let listing = item.get("listing")?;
        let id = text(listing, "/id")?;
        let display = item.pointer("/pricingQuote/structuredStayDisplayPrice/primaryLine")?;
        let price = display
            .get("discountedPrice")
            .and_then(parse_price)
            .or_else(|| display.get("price").and_then(parse_price))?;

        let (rating, review_count) = text(listing, "/avgRatingLocalized")
            .map(|raw| Self::parse_localized_rating(&raw))
            .unwrap_or((None, None));

        Some(NormalizedListing {
            url: Some(Self::room_url(&id)),
            id,
            platform: Platform::Airbnb,
            kind: ListingKind::Hotel,
            name: text(listing, "/title").or_else(|| text(listing, "/name"))?,
            price,
            currency: CURRENCY.to_string(),
            rating,
            review_count,
            location: Location {
                city: text(listing, "/city"),
                address: None,
                latitude: number(listing, "/coordinate/latitude"),
                longitude: number(listing, "/coordinate/longitude"),
            },
            amenities: vec![],
        })
    }

    fn stay_query(request: &DetailsRequest) -> Vec<(&'static str, String)> {
        vec![
            ("propertyId", request.hotel_id.clone()),
            ("checkIn", request.checkin.format("%Y-%m-%d").to_string()),
            ("checkOut", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("currency", CURRENCY.to_string()),
        ]
    }
}

#[async_trait]
impl PlatformAdapter for AirbnbAdapter {
    fn platform(&self) -> Platform {
        Platform::Airbnb
    }

    fn capabilities(&self) -> &'static [ListingCategory] {
        &[ListingCategory::Hotels]
    }

    async fn search_hotels(&self, request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        let query = [
            ("placeId", PLACES.resolve(&request.destination).to_string()),
            ("checkin", request.checkin.format("%Y-%m-%d").to_string()),
            ("checkout", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("currency", CURRENCY.to_string()),
        ];
        let body = self
            .client
            .get("/api/v2/searchPropertyByPlaceId", &query)
            .await?;

        Ok(array(&body, "/data/list")
            .iter()
            .filter_map(|item| self.normalize_listing(item))
            .collect())
    }

    async fn get_hotel_details(&self, request: &DetailsRequest) -> Result<HotelDetails> {
        let body = self
            .client
            .get("/api/v2/getPropertyDetails", &Self::stay_query(request))
            .await?;
        let data = body
            .get("data")
            .filter(|d| !d.is_null())
            .ok_or_else(|| TravelError::provider(Platform::Airbnb, "listing not found"))?;

        let listing = NormalizedListing {
            id: request.hotel_id.clone(),
            platform: Platform::Airbnb,
            kind: ListingKind::Hotel,
            name: text(data, "/title").unwrap_or_default(),
            price: data
                .pointer("/price/price")
                .and_then(parse_price)
                .unwrap_or(0.0),
            currency: CURRENCY.to_string(),
            rating: number(data, "/rating").and_then(|r| scale_rating(r, 5.0)),
            review_count: data.get("reviewCount").and_then(parse_count),
            location: Location {
                city: text(data, "/city"),
                address: text(data, "/location/address"),
                latitude: number(data, "/location/lat"),
                longitude: number(data, "/location/lng"),
            },
            amenities: array(data, "/amenities")
                .iter()
                .filter_map(|a| text(a, "/title"))
                .collect(),
            url: Some(Self::room_url(&request.hotel_id)),
        };

        Ok(HotelDetails {
            listing,
            description: text(data, "/description"),
            check_in_time: text(data, "/checkIn"),
            check_out_time: text(data, "/checkOut"),
            images: array(data, "/images")
                .iter()
                .filter_map(|image| match image {
                    Value::String(url) => Some(url.clone()),
                    other => text(other, "/url"),
                })
                .collect(),
        })
    }

    async fn check_availability(&self, request: &DetailsRequest) -> Result<Availability> {
        let body = self
            .client
            .get("/api/v2/checkAvailability", &Self::stay_query(request))
            .await?;
        let price = body.pointer("/data/price").and_then(parse_price);

        Ok(Availability {
            platform: Platform::Airbnb,
            hotel_id: request.hotel_id.clone(),
            checkin: request.checkin,
            checkout: request.checkout,
            available: body
                .pointer("/data/available")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            price,
            currency: price.map(|_| CURRENCY.to_string()),
            rooms_left: None,
        })
    }

    async fn health_check(&self) -> AdapterHealth {
        self.client.probe("/api/v1/getCategory", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttpClient;
    use chrono::NaiveDate;
    use serde_json::json;

    const BASE: &str = "https://airbnb19.p.rapidapi.com";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn adapter(http: MockHttpClient) -> (AirbnbAdapter, Arc<MockHttpClient>) {
        let http = Arc::new(http);
        (
            AirbnbAdapter::new(AdapterConfig::rapidapi(HOST, "test-key"), http.clone()),
            http,
        )
    }

    #[test]
    fn test_localized_rating() {
        assert_eq!(
            AirbnbAdapter::parse_localized_rating("4.87 (312)"),
            (Some(4.87), Some(312))
        );
        assert_eq!(AirbnbAdapter::parse_localized_rating("New"), (None, None));
    }

    #[tokio::test]
    async fn test_search_parses_stringly_prices() {
        let (airbnb, http) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v2/searchPropertyByPlaceId"),
            json!({"status": true, "data": {"list": [
                {
                    "listing": {
                        "id": "53716544",
                        "title": "Loft in Le Marais",
                        "city": "Paris",
                        "avgRatingLocalized": "4.92 (87)",
                        "coordinate": {"latitude": 48.859, "longitude": 2.362}
                    },
                    "pricingQuote": {"structuredStayDisplayPrice": {"primaryLine": {
                        "price": "$1,480", "discountedPrice": "$1,234"
                    }}}
                },
                {
                    "listing": {"id": "1", "title": "Studio"},
                    "pricingQuote": {"structuredStayDisplayPrice": {"primaryLine": {"price": "$310"}}}
                }
            ]}}),
        ));

        let request = SearchRequest::new("Paris, France", date(10), date(14)).with_guests(3);
        let listings = airbnb.search_hotels(&request).await.unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].price, 1234.0);
        assert_eq!(listings[0].rating, Some(4.92));
        assert_eq!(listings[0].review_count, Some(87));
        assert_eq!(listings[0].url.as_deref(), Some("https://www.airbnb.com/rooms/53716544"));
        assert_eq!(listings[1].price, 310.0);
        assert_eq!(listings[1].rating, None);

        let query = &http.calls()[0].query;
        assert!(query.contains(&("placeId".to_string(), "ChIJD7fiBh9u5kcRYJSMaMOCCwQ".to_string())));
        assert!(query.contains(&("adults".to_string(), "3".to_string())));
    }

    #[tokio::test]
    async fn test_unavailable_listing() {
        let (airbnb, _) = adapter(
            MockHttpClient::new()
                .with_response(
                    format!("{BASE}/api/v2/getPropertyDetails"),
                    json!({"status": false, "message": "Listing not found"}),
                )
                .with_response(
                    format!("{BASE}/api/v2/checkAvailability"),
                    json!({"status": true, "data": {"available": false}}),
                ),
        );
        let request = DetailsRequest::new("404", date(10), date(12));

        let err = airbnb.get_hotel_details(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "airbnb: provider error: Listing not found");

        let availability = airbnb.check_availability(&request).await.unwrap();
        assert!(!availability.available);
        assert_eq!(availability.price, None);
    }

    #[tokio::test]
    async fn test_details() {
        let (airbnb, _) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v2/getPropertyDetails"),
            json!({"status": true, "data": {
                "title": "Loft in Le Marais",
                "description": "Bright loft",
                "rating": 4.9,
                "reviewCount": "1,024",
                "price": {"price": "$412"},
                "location": {"lat": 48.859, "lng": 2.362},
                "amenities": [{"title": "Kitchen"}, {"title": "Wifi"}],
                "checkIn": "16:00",
                "images": ["https://a0.muscache.com/1.jpg", {"url": "https://a0.muscache.com/2.jpg"}]
            }}),
        ));

        let details = airbnb
            .get_hotel_details(&DetailsRequest::new("53716544", date(10), date(14)))
            .await
            .unwrap();
        assert_eq!(details.listing.price, 412.0);
        assert_eq!(details.listing.review_count, Some(1024));
        assert_eq!(details.listing.amenities, vec!["Kitchen", "Wifi"]);
        assert_eq!(details.images.len(), 2);
        assert_eq!(details.check_in_time.as_deref(), Some("16:00"));
    }
}
