//! Forward geocoding helpers for the OpenWeather direct geocoding API.

use crate::types::WeatherError;

/// Maximum candidates requested per search.
pub const GEOCODE_LIMIT: u32 = 5;

/// Build the `q` parameter: `city[,state][,country]`, each part trimmed.
///
/// # Errors
/// Returns `WeatherError::InvalidInput` when the city is blank.
pub fn location_query(city: &str, state: &str, country: &str) -> Result<String, WeatherError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(WeatherError::InvalidInput("city cannot be empty".to_string()));
    }

    let mut query = city.to_string();
    for part in [state.trim(), country.trim()] {
        if !part.is_empty() {
            query.push(',');
            query.push_str(part);
        }
    }
    Ok(query)
}
