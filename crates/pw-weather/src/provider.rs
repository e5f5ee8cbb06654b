use async_trait::async_trait;

use crate::types::{GeoLocation, WeatherError};

/// Source of current temperatures and city coordinates.
///
/// The refresh sweep only needs [`get_temperature`](Self::get_temperature);
/// [`get_city_coordinates`](Self::get_city_coordinates) backs the add-city search.
#[async_trait]
pub trait TemperatureProvider: Send + Sync {
    /// Current temperature at the coordinates, in Fahrenheit regardless of
    /// the units the upstream was queried in.
    async fn get_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, WeatherError>;

    /// Candidate coordinates for a city. `state` and `country` may be empty.
    async fn get_city_coordinates(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> Result<Vec<GeoLocation>, WeatherError>;
}
