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
        AdapterHealth, DetailsRequest, HotelDetails, ListingCategory, ListingKind, Location,
        NormalizedListing, SearchRequest,
    },
    platform::Platform,
};

pub const HOST: &str = "tripadvisor16.p.rapidapi.com";

const GEO_IDS: DestinationTable<&str> = DestinationTable::new(
    &[
        ("paris", "187147"),
        ("london", "186338"),
        ("new york", "60763"),
        ("tokyo", "298184"),
        ("rome", "187791"),
        ("barcelona", "187497"),
        ("amsterdam", "188590"),
        ("dubai", "295424"),
    ],
    "187147",
);

const CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct TripAdvisorAdapter {
    client: ProviderClient,
}

impl TripAdvisorAdapter {
    pub fn new(config: AdapterConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            client: ProviderClient::new(Platform::TripAdvisor, config, http),
        }
    }

    // Search titles come ranked: "3. Hotel Regina Louvre"
    fn strip_rank(title: &str) -> String {
        match title.split_once(". ") {
            Some((rank, rest)) if rank.chars().all(|c| c.is_ascii_digit()) => rest.to_string(),
            _ => title.to_string(),
        }
    }

    fn normalize(item: &Value, kind: ListingKind, price_field: &str) -> Option<NormalizedListing> {
        let id = text(item, "/id")?;
        let name = text(item, "/title")
            .or_else(|| text(item, "/name"))
            .map(|t| Self::strip_rank(&t))?;
        let price = item.get(price_field).and_then(parse_price)?;

        Some(NormalizedListing {
            url: Some(format!("https://www.tripadvisor.com/{id}")),
            id,
            platform: Platform::TripAdvisor,
            kind,
            name,
            price,
            currency: CURRENCY.to_string(),
            rating: number(item, "/bubbleRating/rating")
                .or_else(|| number(item, "/averageRating"))
                .and_then(|r| scale_rating(r, 5.0)),
            review_count: item
                .pointer("/bubbleRating/count")
                .or_else(|| item.get("userReviewCount"))
                .and_then(parse_count),
            location: Location {
                city: text(item, "/secondaryInfo"),
                ..Location::default()
            },
            amenities: vec![],
        })
    }
}

#[async_trait]
impl PlatformAdapter for TripAdvisorAdapter {
    fn platform(&self) -> Platform {
        Platform::TripAdvisor
    }

    fn capabilities(&self) -> &'static [ListingCategory] {
        &[ListingCategory::Hotels, ListingCategory::Activities]
    }

    async fn search_hotels(&self, request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        let query = [
            ("geoId", GEO_IDS.resolve(&request.destination).to_string()),
            ("checkIn", request.checkin.format("%Y-%m-%d").to_string()),
            ("checkOut", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("currencyCode", CURRENCY.to_string()),
        ];
        let body = self.client.get("/api/v1/hotels/searchHotels", &query).await?;

        Ok(array(&body, "/data/data")
            .iter()
            .filter_map(|item| Self::normalize(item, ListingKind::Hotel, "priceForDisplay"))
            .collect())
    }

    async fn get_hotel_details(&self, request: &DetailsRequest) -> Result<HotelDetails> {
        let query = [
            ("id", request.hotel_id.clone()),
            ("checkIn", request.checkin.format("%Y-%m-%d").to_string()),
            ("checkOut", request.checkout.format("%Y-%m-%d").to_string()),
            ("adults", adult_count(request.guests)),
            ("currency", CURRENCY.to_string()),
        ];
        let body = self.client.get("/api/v1/hotels/getHotelDetails", &query).await?;
        let data = body.get("data").ok_or_else(|| {
            TravelError::decode(Platform::TripAdvisor, "missing data in hotel details")
        })?;

        let listing = NormalizedListing {
            id: request.hotel_id.clone(),
            platform: Platform::TripAdvisor,
            kind: ListingKind::Hotel,
            name: text(data, "/title").unwrap_or_default(),
            price: data
                .pointer("/price/displayPrice")
                .and_then(parse_price)
                .unwrap_or(0.0),
            currency: CURRENCY.to_string(),
            rating: number(data, "/rating").and_then(|r| scale_rating(r, 5.0)),
            review_count: data.get("numberReviews").and_then(parse_count),
            location: Location {
                city: None,
                address: text(data, "/location/address"),
                latitude: number(data, "/geoPoint/latitude"),
                longitude: number(data, "/geoPoint/longitude"),
            },
            amenities: array(data, "/amenitiesScreen")
                .iter()
                .flat_map(|group| array(group, "/content"))
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect(),
            url: Some(format!("https://www.tripadvisor.com/{}", request.hotel_id)),
        };

        Ok(HotelDetails {
            listing,
            description: text(data, "/about/title"),
            check_in_time: None,
            check_out_time: None,
            images: array(data, "/photos")
                .iter()
                .filter_map(|p| text(p, "/urlTemplate"))
                .map(|template| template.replace("{width}", "1024").replace("{height}", "768"))
                .collect(),
        })
    }

    async fn search_activities(&self, request: &SearchRequest) -> Result<Vec<NormalizedListing>> {
        let query = [
            ("geoId", GEO_IDS.resolve(&request.destination).to_string()),
            ("startDate", request.checkin.format("%m/%d/%Y").to_string()),
            ("endDate", request.checkout.format("%m/%d/%Y").to_string()),
            ("units", "miles".to_string()),
            ("currencyCode", CURRENCY.to_string()),
        ];
        let body = self
            .client
            .get("/api/v1/attractions/searchAttractions", &query)
            .await?;

        // free entries without a price are left out
        Ok(array(&body, "/data/attractions")
            .iter()
            .filter_map(|item| Self::normalize(item, ListingKind::Activity, "priceInfo"))
            .collect())
    }

    async fn health_check(&self) -> AdapterHealth {
        self.client.probe("/api/v1/test", &[]).await
    }
}
