//! Display rows for tracked locations.

use chrono::{DateTime, Utc};
use pw_weather::DisplayTemperature;
use serde::Serialize;

use crate::location::LocationRecord;

/// One row of the location list, derived from a record on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationView {
    pub id: i64,
    pub city: String,
    pub state: String,
    pub country: String,
    /// `None` until the first successful refresh.
    pub temperature: Option<DisplayTemperature>,
    pub stale: bool,
}

impl LocationView {
    pub fn from_record(record: &LocationRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            city: record.city.clone(),
            state: record.state.clone(),
            country: record.country.clone(),
            temperature: record
                .has_reading()
                .then(|| DisplayTemperature::from_fahrenheit(record.temperature)),
            stale: record.is_stale(now),
        }
    }

    pub fn place(&self) -> String {
        [self.city.as_str(), self.state.as_str(), self.country.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for LocationView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>4}  {:<32}", self.id, self.place())?;
        match self.temperature {
            Some(t) => write!(f, "{:>5}°F {:>5}°C", t.fahrenheit, t.celsius)?,
            None => write!(f, "{:>7} {:>7}", "--", "--")?,
        }
        if self.stale {
            write!(f, "  (stale)")?;
        }
        Ok(())
    }
}

pub fn build_views(records: &[LocationRecord], now: DateTime<Utc>) -> Vec<LocationView> {
    records
        .iter()
        .map(|r| LocationView::from_record(r, now))
        .collect()
}
