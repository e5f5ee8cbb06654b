//! OpenWeather adapter for [`TemperatureProvider`].
//!
//! Uses the current weather endpoint (`/data/2.5/weather`) for temperatures and
//! the direct geocoding endpoint (`/geo/1.0/direct`) for city searches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pw_core::{Units, WeatherConfig};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::geocode::{location_query, GEOCODE_LIMIT};
use crate::provider::TemperatureProvider;
use crate::retry::{send_with_retry, RetryPolicy};
use crate::types::{GeoLocation, WeatherError};
use crate::units::to_fahrenheit;

const CURRENT_WEATHER_PATH: &str = "data/2.5/weather";
const DIRECT_GEOCODE_PATH: &str = "geo/1.0/direct";
const USER_AGENT: &str = concat!("personal-weather/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Arc<Client>,
    api_key: String,
    base_url: Url,
    units: Units,
    retry: RetryPolicy,
}

impl OpenWeatherClient {
    /// # Errors
    /// Returns `WeatherError::InvalidInput` for an unparseable base URL.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        units: Units,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| WeatherError::InvalidInput(format!("invalid base URL: {}", e)))?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            api_key: api_key.into(),
            base_url,
            units,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let client = Self::new(
            config.api_key.clone(),
            &config.base_url,
            config.units,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(client.with_retry(RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        }))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, WeatherError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| WeatherError::InvalidInput(format!("invalid endpoint {}: {}", path, e)))?;
        url.query_pairs_mut().append_pair("appid", &self.api_key);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, WeatherError> {
        let response = send_with_retry(&self.retry, || self.client.get(url.clone()).send()).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(WeatherError::InvalidApiKey);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TemperatureProvider for OpenWeatherClient {
    async fn get_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, WeatherError> {
        let mut url = self.endpoint(CURRENT_WEATHER_PATH)?;
        url.query_pairs_mut()
            .append_pair("lat", &latitude.to_string())
            .append_pair("lon", &longitude.to_string())
            .append_pair("units", self.units.as_query());

        let body: CurrentWeatherResponse = self.get_json(url).await?;
        let fahrenheit = to_fahrenheit(body.main.temp, self.units);
        tracing::debug!(latitude, longitude, raw = body.main.temp, fahrenheit, "Fetched temperature");
        Ok(fahrenheit)
    }

    async fn get_city_coordinates(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> Result<Vec<GeoLocation>, WeatherError> {
        let query = location_query(city, state, country)?;

        let mut url = self.endpoint(DIRECT_GEOCODE_PATH)?;
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("limit", &GEOCODE_LIMIT.to_string());

        let locations: Vec<GeoLocation> = self.get_json(url).await?;
        tracing::info!(query = %query, candidates = locations.len(), "Geocoded city");
        Ok(locations)
    }
}
