use pw_core::{AppError, NetworkError, ReqwestErrorExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A geocoding candidate for a city search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

impl GeoLocation {
    /// "Austin, Texas, US" with empty parts left out.
    pub fn display_name(&self) -> String {
        [self.name.as_str(), self.state.as_str(), self.country.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Weather provider errors.
///
/// Every variant means the provider could not answer; the refresh sweep
/// treats all of them as a per-record failure.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Weather API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Network(e) => e.user_message(),
            WeatherError::Status { status, .. } if *status >= 500 => {
                "Weather service unavailable. Please try again later."
            }
            WeatherError::Status { .. } => "Weather service error. Please try again.",
            WeatherError::InvalidApiKey => "Weather API key is invalid. Check settings.",
            WeatherError::Parse(_) => "Received an unexpected weather response.",
            WeatherError::InvalidInput(_) => "Check the city name and try again.",
            WeatherError::Timeout(_) => "The weather service took too long to answer.",
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        WeatherError::Network(e.into_network_error())
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Network(inner) => AppError::Network(inner),
            WeatherError::InvalidInput(msg) => AppError::InvalidInput(msg),
            other => AppError::Provider(other.to_string()),
        }
    }
}
