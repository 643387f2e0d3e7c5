use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TravelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Booking,
    Airbnb,
    Skyscanner,
    TripAdvisor,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Booking,
        Platform::Airbnb,
        Platform::Skyscanner,
        Platform::TripAdvisor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Booking => "booking",
            Platform::Airbnb => "airbnb",
            Platform::Skyscanner => "skyscanner",
            Platform::TripAdvisor => "tripadvisor",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "booking" | "booking.com" => Ok(Platform::Booking),
            "airbnb" => Ok(Platform::Airbnb),
            "skyscanner" => Ok(Platform::Skyscanner),
            "tripadvisor" => Ok(Platform::TripAdvisor),
            other => Err(TravelError::UnknownPlatform(other.to_string())),
        }
    }
}

/// `"all"` or a single platform name, as sent by route handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlatformSelector {
    #[default]
    All,
    Only(Platform),
}

impl PlatformSelector {
    pub fn includes(&self, platform: Platform) -> bool {
        match self {
            PlatformSelector::All => true,
            PlatformSelector::Only(p) => *p == platform,
        }
    }
}

impl FromStr for PlatformSelector {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") || s.trim().is_empty() {
            return Ok(PlatformSelector::All);
        }
        s.parse().map(PlatformSelector::Only)
    }
}

impl TryFrom<String> for PlatformSelector {
    type Error = TravelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlatformSelector> for String {
    fn from(selector: PlatformSelector) -> Self {
        match selector {
            PlatformSelector::All => "all".to_string(),
            PlatformSelector::Only(p) => p.as_str().to_string(),
        }
    }
}
