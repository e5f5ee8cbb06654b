//! Temperature scale conversions.
//!
//! Stored readings are always Fahrenheit; Celsius is derived every time a
//! reading is shown.

use pw_core::Units;
use serde::Serialize;

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

const KELVIN_OFFSET: f64 = 273.15;

/// Convert a provider value measured in `units` to Fahrenheit.
pub fn to_fahrenheit(value: f64, units: Units) -> f64 {
    match units {
        Units::Imperial => value,
        Units::Metric => celsius_to_fahrenheit(value),
        Units::Standard => celsius_to_fahrenheit(value - KELVIN_OFFSET),
    }
}

/// A reading expressed in both display scales, rounded to whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayTemperature {
    pub fahrenheit: i64,
    pub celsius: i64,
}

impl DisplayTemperature {
    pub fn from_fahrenheit(fahrenheit: f64) -> Self {
        Self {
            fahrenheit: fahrenheit.round() as i64,
            celsius: fahrenheit_to_celsius(fahrenheit).round() as i64,
        }
    }
}
