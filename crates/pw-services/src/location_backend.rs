//! Location storage backend trait and error types.

use chrono::{DateTime, Duration, Utc};
use pw_core::{AppError, DatabaseError, RusqliteErrorExt};
use thiserror::Error;

use crate::location::{LocationKey, LocationRecord};

/// Errors that can occur during location store operations.
#[derive(Debug, Error)]
pub enum LocationStoreError {
    /// Delete/update target does not exist.
    #[error("Location not found: {0}")]
    NotFound(String),

    /// Store unavailable or query failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    /// Rejected input (empty city, coordinates out of range).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LocationStoreError {
    pub fn not_found(key: impl ToString) -> Self {
        Self::NotFound(key.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<rusqlite::Error> for LocationStoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.into_database_error())
    }
}

impl From<LocationStoreError> for AppError {
    fn from(e: LocationStoreError) -> Self {
        match e {
            LocationStoreError::NotFound(key) => AppError::NotFound(key),
            LocationStoreError::Persistence(db) => AppError::Database(db),
            LocationStoreError::Validation(msg) => AppError::InvalidInput(msg),
            LocationStoreError::Other(err) => AppError::Other(err),
        }
    }
}

pub type LocationStoreResult<T> = Result<T, LocationStoreError>;

/// Durable storage for tracked locations.
///
/// Implementations are blocking; [`LocationClient`](crate::LocationClient)
/// moves calls onto the blocking pool and serializes access.
pub trait LocationStore: Send {
    /// Insert a record with temperature 0 and no expiry. No duplicate check.
    fn save(
        &self,
        city: &str,
        state: &str,
        country: &str,
        latitude: f64,
        longitude: f64,
    ) -> LocationStoreResult<i64>;

    fn get(&self, id: i64) -> LocationStoreResult<Option<LocationRecord>>;

    /// Records never refreshed or with `expires_at < now`.
    fn list_expired(&self, now: DateTime<Utc>) -> LocationStoreResult<Vec<LocationRecord>>;

    fn list_all(&self) -> LocationStoreResult<Vec<LocationRecord>>;

    /// Store a fresh reading: `expires_at = now + 30min`, claim cleared.
    ///
    /// # Errors
    /// `NotFound` when no record has this id.
    fn update_after_refresh(
        &self,
        id: i64,
        temperature: f64,
        now: DateTime<Utc>,
    ) -> LocationStoreResult<()>;

    /// Remove exactly one record.
    ///
    /// # Errors
    /// `NotFound` when nothing matched.
    fn delete(&self, key: &LocationKey) -> LocationStoreResult<()>;

    /// Oldest record matching the natural key, if any.
    fn find_one(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> LocationStoreResult<Option<LocationRecord>>;

    /// Mark a stale, unclaimed record as being refreshed until `now + ttl`.
    ///
    /// Returns `false` if the record is fresh, gone, or claimed by another sweep.
    fn try_claim(&self, id: i64, now: DateTime<Utc>, ttl: Duration) -> LocationStoreResult<bool>;

    fn release_claim(&self, id: i64) -> LocationStoreResult<()>;

    fn count(&self) -> LocationStoreResult<usize>;
}

/// Check a new location before it is stored.
///
/// # Errors
/// Returns `LocationStoreError::Validation` if:
/// - City is empty or whitespace-only.
/// - Latitude is outside [-90, 90] or longitude outside [-180, 180].
pub fn validate_new_location(city: &str, latitude: f64, longitude: f64) -> LocationStoreResult<()> {
    if city.trim().is_empty() {
        return Err(LocationStoreError::validation("City cannot be empty"));
    }
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(LocationStoreError::validation(format!(
            "Latitude {} is out of range",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(LocationStoreError::validation(format!(
            "Longitude {} is out of range",
            longitude
        )));
    }
    Ok(())
}
