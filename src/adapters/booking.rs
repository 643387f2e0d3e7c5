use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    adult_count, array, number, scale_rating, text, AdapterConfig, DestinationTable,
    PlatformAdapter, ProviderClient,
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

pub const HOST: &str = "booking-com15.p.rapidapi.com";

const DESTINATIONS: DestinationTable<&str> = DestinationTable::new(
    &[
        ("paris", "-1456928"),
        ("london", "-2601889"),
        ("new york", "20088325"),
        ("tokyo", "-246227"),
        ("rome", "-126693"),
        ("barcelona", "-372490"),
        ("amsterdam", "-2140479"),
        ("dubai", "-782831"),
    ],
    "-1456928",
);

const CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct BookingAdapter {
    client: ProviderClient,
}

impl BookingAdapter {
    pub fn new(config: AdapterConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            client: ProviderClient::new(Platform::Booking, config, http),
        }
    }

    fn hotel_url(id: &str) -> String {
        format!("https://www.booking.com/hotel.html?hotel_id={id}")
    }

    fn normalize_hotel(&self, item: &Value) -> Option<NormalizedListing> {
        let id = text(item, "/hotel_id")?;
        let property = item.get("property")?;
        let price = number(property, "/priceBreakdown/grossPrice/value")?;

        Some(NormalizedListing {
            url: Some(Self::hotel_url(&id)),
            id,
            platform: Platform::Booking,
            kind: ListingKind::Hotel,
            name: text(property, "/name")?,
            price,
            currency: text(property, "/priceBreakdown/grossPrice/currency")
                .unwrap_or_else(|| CURRENCY.to_string()),
            rating: number(property, "/reviewScore").and_then(|r| scale_rating(r, 10.0)),
            review_count: number(property, "/reviewCount").map(|n| n as u32),
            location: Location {
                city: text(property, "/wishlistName"),
                address: None,
                latitude: number(property, "/latitude"),
                longitude: number(property, "/longitude"),
            },
            amenities: vec![],
        })
    }

    fn stay_query(&self, request: &DetailsRequest) -> Vec<(&'static str, String)> {
        vec![
            ("hotel_id", request.hotel_id.clone()),
            ("arrival_date", request.checkin.format("%Y-%m-%d").to_string()),
            ("departure_date", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("currency_code", CURRENCY.to_string()),
        ]
    }
}

#[async_trait]
impl PlatformAdapter for BookingAdapter {
    fn platform(&self) -> Platform {
        Platform::Booking
    }

    fn capabilities(&self) -> &'static [ListingCategory] {
        &[ListingCategory::Hotels]
    }

    async fn search_hotels(&self, request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        let query = [
            ("dest_id", DESTINATIONS.resolve(&request.destination).to_string()),
            ("search_type", "CITY".to_string()),
            ("arrival_date", request.checkin.format("%Y-%m-%d").to_string()),
            ("departure_date", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("room_qty", "1".to_string()),
            ("currency_code", CURRENCY.to_string()),
        ];
        let body = self.client.get("/api/v1/hotels/searchHotels", &query).await?;

        Ok(array(&body, "/data/hotels")
            .iter()
            .filter_map(|item| self.normalize_hotel(item))
            .collect())
    }

    async fn get_hotel_details(&self, request: &DetailsRequest) -> Result<HotelDetails> {
        let body = self
            .client
            .get("/api/v1/hotels/getHotelDetails", &self.stay_query(request))
            .await?;
        let data = body
            .get("data")
            .ok_or_else(|| TravelError::decode(Platform::Booking, "missing data in hotel details"))?;

        let listing = NormalizedListing {
            id: text(data, "/hotel_id").unwrap_or_else(|| request.hotel_id.clone()),
            platform: Platform::Booking,
            kind: ListingKind::Hotel,
            name: text(data, "/hotel_name").unwrap_or_default(),
            price: number(data, "/composite_price_breakdown/gross_amount/value").unwrap_or(0.0),
            currency: text(data, "/composite_price_breakdown/gross_amount/currency")
                .unwrap_or_else(|| CURRENCY.to_string()),
            rating: number(data, "/review_score").and_then(|r| scale_rating(r, 10.0)),
            review_count: number(data, "/review_nr").map(|n| n as u32),
            location: Location {
                city: text(data, "/city"),
                address: text(data, "/address"),
                latitude: number(data, "/latitude"),
                longitude: number(data, "/longitude"),
            },
            amenities: array(data, "/facilities_block/facilities")
                .iter()
                .filter_map(|f| text(f, "/name"))
                .collect(),
            url: text(data, "/url").or_else(|| Some(Self::hotel_url(&request.hotel_id))),
        };

        Ok(HotelDetails {
            listing,
            description: text(data, "/description"),
            check_in_time: text(data, "/checkin/from"),
            check_out_time: text(data, "/checkout/until"),
            images: array(data, "/photos")
                .iter()
                .filter_map(|p| text(p, "/url_original"))
                .collect(),
        })
    }

    async fn check_availability(&self, request: &DetailsRequest) -> Result<Availability> {
        let body = self
            .client
            .get("/api/v1/hotels/getRoomList", &self.stay_query(request))
            .await?;
        let rooms = array(&body, "/data/block");

        let cheapest = rooms
            .iter()
            .filter_map(|room| number(room, "/min_price/price"))
            .min_by(f64::total_cmp);
        let currency = rooms.iter().find_map(|room| text(room, "/min_price/currency"));

        Ok(Availability {
            platform: Platform::Booking,
            hotel_id: request.hotel_id.clone(),
            checkin: request.checkin,
            checkout: request.checkout,
            available: !rooms.is_empty(),
            price: cheapest,
            currency: currency.or_else(|| cheapest.map(|_| CURRENCY.to_string())),
            rooms_left: Some(rooms.len() as u32),
        })
    }

    async fn health_check(&self) -> AdapterHealth {
        self.client.probe("/api/v1/meta/getCurrency", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttpClient;
    use chrono::NaiveDate;
    use serde_json::json;

    const BASE: &str = "https://booking-com15.p.rapidapi.com";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn adapter(http: MockHttpClient) -> (BookingAdapter, Arc<MockHttpClient>) {
        let http = Arc::new(http);
        (
            BookingAdapter::new(AdapterConfig::rapidapi(HOST, "test-key"), http.clone()),
            http,
        )
    }

    #[tokio::test]
    async fn test_search_hotels_normalizes_listings() {
        let (booking, http) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v1/hotels/searchHotels"),
            json!({
                "status": true,
                "message": "Success",
                "data": {"hotels": [
                    {
                        "hotel_id": 10452,
                        "property": {
                            "name": "Hotel Lutetia",
                            "reviewScore": 9.0,
                            "reviewCount": 1520,
                            "wishlistName": "Paris",
                            "latitude": 48.851,
                            "longitude": 2.327,
                            "priceBreakdown": {"grossPrice": {"value": 612.4, "currency": "EUR"}}
                        }
                    },
                    {"hotel_id": 99, "property": {"name": "No price"}}
                ]}
            }),
        ));

        let request = SearchRequest::new("Paris", date(1), date(3)).with_guests(2);
        let hotels = booking.search_hotels(&request).await.unwrap();

        assert_eq!(hotels.len(), 1);
        let hotel = &hotels[0];
        assert_eq!(hotel.id, "10452");
        assert_eq!(hotel.price, 612.4);
        assert_eq!(hotel.currency, "EUR");
        assert_eq!(hotel.rating, Some(4.5));
        assert_eq!(hotel.location.city.as_deref(), Some("Paris"));
        assert!(hotel.url.as_deref().unwrap().contains("10452"));

        let query = &http.calls()[0].query;
        assert!(query.contains(&("dest_id".to_string(), "-1456928".to_string())));
        assert!(query.contains(&("arrival_date".to_string(), "2025-03-01".to_string())));
        assert!(query.contains(&("adults".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_destination_falls_back_to_default_id() {
        let (booking, http) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v1/hotels/searchHotels"),
            json!({"status": true, "data": {"hotels": []}}),
        ));
        let request = SearchRequest::new("Reykjavik", date(1), date(2));
        assert!(booking.search_hotels(&request).await.unwrap().is_empty());
        assert!(http.calls()[0]
            .query
            .contains(&("dest_id".to_string(), "-1456928".to_string())));
    }

    #[tokio::test]
    async fn test_envelope_error_is_reported() {
        let (booking, _) = adapter(MockHttpClient::new().with_response(
            format!("{BASE}/api/v1/hotels/searchHotels"),
            json!({"status": false, "message": [{"dest_id": "dest_id is invalid"}]}),
        ));
        let err = booking
            .search_hotels(&SearchRequest::new("London", date(1), date(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, TravelError::Provider { platform: Platform::Booking, .. }));
        assert!(err.to_string().contains("dest_id is invalid"));
    }

    #[tokio::test]
    async fn test_details_and_availability() {
        let (booking, _) = adapter(
            MockHttpClient::new()
                .with_response(
                    format!("{BASE}/api/v1/hotels/getHotelDetails"),
                    json!({"status": true, "data": {
                        "hotel_id": 10452,
                        "hotel_name": "Hotel Lutetia",
                        "address": "45 Boulevard Raspail",
                        "city": "Paris",
                        "review_score": 8.6,
                        "review_nr": 1520,
                        "composite_price_breakdown": {"gross_amount": {"value": 612.4, "currency": "EUR"}},
                        "facilities_block": {"facilities": [{"name": "Spa"}, {"name": "Free WiFi"}]},
                        "checkin": {"from": "15:00"},
                        "checkout": {"until": "12:00"},
                        "photos": [{"url_original": "https://cf.bstatic.com/1.jpg"}]
                    }}),
                )
                .with_response(
                    format!("{BASE}/api/v1/hotels/getRoomList"),
                    json!({"status": true, "data": {"block": [
                        {"min_price": {"price": 320.0, "currency": "EUR"}},
                        {"min_price": {"price": 290.5, "currency": "EUR"}}
                    ]}}),
                ),
        );
        let request = DetailsRequest::new("10452", date(1), date(3));

        let details = booking.get_hotel_details(&request).await.unwrap();
        assert_eq!(details.listing.name, "Hotel Lutetia");
        assert_eq!(details.listing.rating, Some(4.3));
        assert_eq!(details.listing.amenities, vec!["Spa", "Free WiFi"]);
        assert_eq!(details.check_in_time.as_deref(), Some("15:00"));
        assert_eq!(details.images.len(), 1);

        let availability = booking.check_availability(&request).await.unwrap();
        assert!(availability.available);
        assert_eq!(availability.price, Some(290.5));
        assert_eq!(availability.rooms_left, Some(2));
    }

    #[tokio::test]
    async fn test_unsupported_categories() {
        let (booking, _) = adapter(MockHttpClient::new());
        let request = SearchRequest::new("Paris", date(1), date(2));
        assert!(booking.search_flights(&request).await.unwrap_err().is_not_supported());
        assert!(booking.search_activities(&request).await.unwrap_err().is_not_supported());
    }
}
