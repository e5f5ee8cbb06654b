//! Temperature provider for Personal Weather
//!
//! Defines the [`TemperatureProvider`] seam used by the refresh sweep and the
//! OpenWeather adapter behind it, plus display-time unit conversion.

pub mod geocode;
pub mod openweather;
pub mod provider;
pub mod retry;
pub mod types;
pub mod units;

pub use openweather::OpenWeatherClient;
pub use provider::TemperatureProvider;
pub use retry::RetryPolicy;
pub use types::*;
pub use units::{fahrenheit_to_celsius, to_fahrenheit, DisplayTemperature};
