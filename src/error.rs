use thiserror::Error;

use crate::{error_handler::EnhancedError, http::HttpError, platform::Platform};

pub type Result<T> = std::result::Result<T, TravelError>;

// Every variant that originates at a provider carries the platform so messages stay
// qualified as they travel through the retry and fan-out layers.
#[derive(Error, Debug, Clone)]
pub enum TravelError {
    #[error("{platform}: network error: {message}")]
    Network { platform: Platform, message: String },

    #[error("{platform}: request timeout after {timeout_ms}ms")]
    Timeout { platform: Platform, timeout_ms: u64 },

    #[error("{platform}: HTTP {status}: {message}")]
    Http {
        platform: Platform,
        status: u16,
        message: String,
    },

    #[error("{platform}: provider error: {message}")]
    Provider { platform: Platform, message: String },

    #[error("{platform}: failed to decode response: {message}")]
    Decode { platform: Platform, message: String },

    #[error("{platform}: {operation} is not supported")]
    NotSupported {
        platform: Platform,
        operation: &'static str,
    },

    #[error("Circuit breaker open for {platform}")]
    CircuitOpen {
        platform: Platform,
        retry_after_ms: u64,
    },

    #[error(transparent)]
    RetriesExhausted(Box<EnhancedError>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TravelError {
    pub fn from_http(platform: Platform, error: HttpError) -> Self {
        match error {
            HttpError::Timeout { timeout_ms } => TravelError::Timeout {
                platform,
                timeout_ms,
            },
            HttpError::Connect(message) => TravelError::Network { platform, message },
            HttpError::Status { status, body } => TravelError::Http {
                platform,
                status,
                message: body,
            },
            HttpError::Decode(message) => TravelError::Decode { platform, message },
            HttpError::Other(message) => TravelError::Network { platform, message },
        }
    }

    pub fn provider(platform: Platform, message: impl Into<String>) -> Self {
        TravelError::Provider {
            platform,
            message: message.into(),
        }
    }

    pub fn decode(platform: Platform, message: impl Into<String>) -> Self {
        TravelError::Decode {
            platform,
            message: message.into(),
        }
    }

    pub fn not_supported(platform: Platform, operation: &'static str) -> Self {
        TravelError::NotSupported {
            platform,
            operation,
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        match self {
            TravelError::Network { platform, .. }
            | TravelError::Timeout { platform, .. }
            | TravelError::Http { platform, .. }
            | TravelError::Provider { platform, .. }
            | TravelError::Decode { platform, .. }
            | TravelError::NotSupported { platform, .. }
            | TravelError::CircuitOpen { platform, .. } => Some(*platform),
            TravelError::RetriesExhausted(enhanced) => Some(enhanced.platform),
            TravelError::InvalidRequest(_)
            | TravelError::UnknownPlatform(_)
            | TravelError::Config(_) => None,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, TravelError::NotSupported { .. })
    }

    /// Rejected before any request reached the provider.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TravelError::NotSupported { .. }
                | TravelError::InvalidRequest(_)
                | TravelError::UnknownPlatform(_)
        )
    }
}
