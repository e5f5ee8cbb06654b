use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a successful refresh keeps a record fresh.
pub fn refresh_ttl() -> Duration {
    Duration::minutes(30)
}

/// One tracked place and its most recent temperature.
///
/// `latitude`/`longitude` are fixed at creation. `temperature` and
/// `expires_at` change only through a successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: i64,
    pub city: String,
    pub state: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Last observed reading in Fahrenheit; 0 until the first refresh.
    pub temperature: f64,
    /// `None` until the first successful refresh.
    pub expires_at: Option<DateTime<Utc>>,
}

impl LocationRecord {
    /// Stale iff never refreshed or `expires_at < now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires < now)
    }

    /// Whether a refresh has ever succeeded for this record.
    pub fn has_reading(&self) -> bool {
        self.expires_at.is_some()
    }
}

/// Selects a record for deletion.
///
/// The natural key is not unique; deleting by it removes the oldest match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationKey {
    Id(i64),
    Natural {
        city: String,
        state: String,
        country: String,
    },
}

impl LocationKey {
    pub fn natural(
        city: impl Into<String>,
        state: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self::Natural {
            city: city.into(),
            state: state.into(),
            country: country.into(),
        }
    }
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationKey::Id(id) => write!(f, "id {}", id),
            LocationKey::Natural {
                city,
                state,
                country,
            } => write!(f, "{}/{}/{}", city, state, country),
        }
    }
}
