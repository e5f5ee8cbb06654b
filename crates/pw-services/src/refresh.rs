//! Refresh-on-read for tracked locations.
//!
//! A sweep walks the stale records one at a time, asks the provider for a
//! fresh reading and stores it. A failure for one record (provider error,
//! timeout, failed update) is logged and skipped; only the initial expired
//! scan and the final listing can fail the call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pw_core::config::MAX_CLAIM_SECONDS;
use pw_core::{Config, WeatherConfig};
use pw_weather::{TemperatureProvider, WeatherError};

use crate::location::LocationRecord;
use crate::location_backend::LocationStoreResult;
use crate::location_client::LocationClient;

pub const DEFAULT_CLAIM_SECONDS: u64 = 60;

/// Claim lifetime for `seconds`, clamped to `1..=MAX_CLAIM_SECONDS`.
pub fn claim_ttl(seconds: u64) -> chrono::Duration {
    let clamped = seconds.clamp(1, MAX_CLAIM_SECONDS);
    i64::try_from(clamped)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| chrono::Duration::days(1))
}

/// Which step a per-record refresh failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider error or timeout; the record keeps its previous reading.
    Provider,
    /// Claim or update write failed.
    Store,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshFailure {
    pub id: i64,
    pub city: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Per-record outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub refreshed: Vec<i64>,
    /// Claimed by a concurrent sweep, or no longer stale.
    pub skipped: Vec<i64>,
    pub failed: Vec<RefreshFailure>,
}

impl RefreshReport {
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.skipped.len() + self.failed.len()
    }
}

enum Outcome {
    Refreshed,
    Skipped,
    Failed(FailureKind, String),
}

pub struct RefreshOrchestrator {
    store: LocationClient,
    provider: Arc<dyn TemperatureProvider>,
    provider_timeout: Duration,
    claim_ttl: chrono::Duration,
}

impl RefreshOrchestrator {
    pub fn new(store: LocationClient, provider: Arc<dyn TemperatureProvider>) -> Self {
        Self {
            store,
            provider,
            provider_timeout: WeatherConfig::default().retry_budget(),
            claim_ttl: claim_ttl(DEFAULT_CLAIM_SECONDS),
        }
    }

    /// Provider timeout defaults to the HTTP retry budget so a timed-out
    /// request can still be retried inside one sweep.
    pub fn from_config(
        store: LocationClient,
        provider: Arc<dyn TemperatureProvider>,
        config: &Config,
    ) -> Self {
        Self::new(store, provider)
            .with_provider_timeout(config.provider_timeout())
            .with_claim_ttl(claim_ttl(config.refresh.claim_seconds))
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_claim_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Refresh every stale record, then return all records.
    ///
    /// # Errors
    /// Only a store failure while listing expired or all records.
    pub async fn refresh_and_list(
        &self,
        now: DateTime<Utc>,
    ) -> LocationStoreResult<Vec<LocationRecord>> {
        let report = self.refresh_sweep(now).await?;
        if report.attempted() > 0 {
            tracing::info!(
                refreshed = report.refreshed.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "Refresh sweep finished"
            );
        }
        self.store.list_all().await
    }

    /// One pass over the stale records, sequentially.
    ///
    /// # Errors
    /// Only when the expired scan itself fails.
    pub async fn refresh_sweep(&self, now: DateTime<Utc>) -> LocationStoreResult<RefreshReport> {
        let expired = self.store.list_expired(now).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to load expired locations");
            e
        })?;

        let mut report = RefreshReport::default();
        for record in &expired {
            match self.refresh_one(record, now).await {
                Outcome::Refreshed => report.refreshed.push(record.id),
                Outcome::Skipped => report.skipped.push(record.id),
                Outcome::Failed(kind, reason) => report.failed.push(RefreshFailure {
                    id: record.id,
                    city: record.city.clone(),
                    kind,
                    reason,
                }),
            }
        }
        Ok(report)
    }

    async fn refresh_one(&self, record: &LocationRecord, now: DateTime<Utc>) -> Outcome {
        match self.store.try_claim(record.id, now, self.claim_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(id = record.id, city = %record.city, "Location already being refreshed");
                return Outcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(id = record.id, city = %record.city, error = %e, "Failed to claim location");
                return Outcome::Failed(FailureKind::Store, e.to_string());
            }
        }

        let temperature = match self.fetch_temperature(record).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    id = record.id,
                    city = %record.city,
                    error = %e,
                    "Failed to fetch temperature, keeping previous reading"
                );
                self.release(record).await;
                return Outcome::Failed(FailureKind::Provider, e.to_string());
            }
        };

        if let Err(e) = self.store.update_after_refresh(record.id, temperature, now).await {
            tracing::warn!(id = record.id, city = %record.city, error = %e, "Failed to store refreshed temperature");
            self.release(record).await;
            return Outcome::Failed(FailureKind::Store, e.to_string());
        }

        tracing::info!(id = record.id, city = %record.city, temperature, "Location refreshed");
        Outcome::Refreshed
    }

    async fn fetch_temperature(&self, record: &LocationRecord) -> Result<f64, WeatherError> {
        let call = self
            .provider
            .get_temperature(record.latitude, record.longitude);
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(WeatherError::Timeout(self.provider_timeout)),
        }
    }

    async fn release(&self, record: &LocationRecord) {
        if let Err(e) = self.store.release_claim(record.id).await {
            tracing::debug!(id = record.id, error = %e, "Failed to release claim; it will lapse");
        }
    }
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("provider_timeout", &self.provider_timeout)
            .field("claim_ttl", &self.claim_ttl)
            .finish_non_exhaustive()
    }
}
