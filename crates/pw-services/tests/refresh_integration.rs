//! Refresh sweep scenarios against an in-memory store and scripted providers.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pw_core::{Config, DatabaseError, NetworkError};
use pw_services::{
    FailureKind, LocationClient, LocationKey, LocationRecord, LocationStore, LocationStoreError,
    LocationStoreResult, RefreshOrchestrator, SqliteLocationStore,
};
use pw_weather::{GeoLocation, TemperatureProvider, WeatherError};

/// Answers by latitude; a missing latitude is an upstream failure.
#[derive(Default)]
struct ScriptedProvider {
    readings: Mutex<HashMap<String, f64>>,
    calls: Mutex<Vec<(f64, f64)>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    fn with(readings: &[(f64, f64)]) -> Self {
        let provider = Self::default();
        for (lat, temp) in readings {
            provider.set(*lat, *temp);
        }
        provider
    }

    fn set(&self, latitude: f64, temperature: f64) {
        self.readings.lock().insert(latitude.to_string(), temperature);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TemperatureProvider for ScriptedProvider {
    async fn get_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, WeatherError> {
        self.calls.lock().push((latitude, longitude));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reading = self.readings.lock().get(&latitude.to_string()).copied();
        reading.ok_or_else(|| WeatherError::Network(NetworkError::Unreachable("unreachable".into())))
    }

    async fn get_city_coordinates(
        &self,
        _city: &str,
        _state: &str,
        _country: &str,
    ) -> Result<Vec<GeoLocation>, WeatherError> {
        Ok(Vec::new())
    }
}

/// Never answers.
struct HangingProvider;

#[async_trait]
impl TemperatureProvider for HangingProvider {
    async fn get_temperature(&self, _latitude: f64, _longitude: f64) -> Result<f64, WeatherError> {
        std::future::pending().await
    }

    async fn get_city_coordinates(
        &self,
        _city: &str,
        _state: &str,
        _country: &str,
    ) -> Result<Vec<GeoLocation>, WeatherError> {
        std::future::pending().await
    }
}

/// Wraps a real store and fails selected operations.
struct FlakyStore {
    inner: SqliteLocationStore,
    fail_list_expired: bool,
    fail_list_all: bool,
    fail_update_for: Option<i64>,
}

impl FlakyStore {
    fn new(inner: SqliteLocationStore) -> Self {
        Self {
            inner,
            fail_list_expired: false,
            fail_list_all: false,
            fail_update_for: None,
        }
    }
}

fn broken() -> LocationStoreError {
    LocationStoreError::Persistence(DatabaseError::Query("disk I/O error".into()))
}

impl LocationStore for FlakyStore {
    fn save(&self, city: &str, state: &str, country: &str, lat: f64, lon: f64) -> LocationStoreResult<i64> {
        self.inner.save(city, state, country, lat, lon)
    }

    fn get(&self, id: i64) -> LocationStoreResult<Option<LocationRecord>> {
        self.inner.get(id)
    }

    fn list_expired(&self, now: DateTime<Utc>) -> LocationStoreResult<Vec<LocationRecord>> {
        if self.fail_list_expired {
            return Err(broken());
        }
        self.inner.list_expired(now)
    }

    fn list_all(&self) -> LocationStoreResult<Vec<LocationRecord>> {
        if self.fail_list_all {
            return Err(broken());
        }
        self.inner.list_all()
    }

    fn update_after_refresh(&self, id: i64, temperature: f64, now: DateTime<Utc>) -> LocationStoreResult<()> {
        if self.fail_update_for == Some(id) {
            return Err(broken());
        }
        self.inner.update_after_refresh(id, temperature, now)
    }

    fn delete(&self, key: &LocationKey) -> LocationStoreResult<()> {
        self.inner.delete(key)
    }

    fn find_one(&self, city: &str, state: &str, country: &str) -> LocationStoreResult<Option<LocationRecord>> {
        self.inner.find_one(city, state, country)
    }

    fn try_claim(&self, id: i64, now: DateTime<Utc>, ttl: chrono::Duration) -> LocationStoreResult<bool> {
        self.inner.try_claim(id, now, ttl)
    }

    fn release_claim(&self, id: i64) -> LocationStoreResult<()> {
        self.inner.release_claim(id)
    }

    fn count(&self) -> LocationStoreResult<usize> {
        self.inner.count()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

fn minutes(m: i64) -> chrono::Duration {
    chrono::Duration::minutes(m)
}

fn memory_client() -> LocationClient {
    LocationClient::new(SqliteLocationStore::in_memory().unwrap())
}

fn find(records: &[LocationRecord], id: i64) -> &LocationRecord {
    records.iter().find(|r| r.id == id).unwrap()
}

#[tokio::test]
async fn test_austin_refresh_lifecycle() {
    let client = memory_client();
    let austin = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0)]));
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider.clone());

    let records = orchestrator.refresh_and_list(t0()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].temperature, 75.0);
    assert_eq!(records[0].expires_at, Some(t0() + minutes(30)));
    assert_eq!(provider.call_count(), 1);

    // still fresh ten minutes later
    provider.set(30.27, 80.0);
    let records = orchestrator.refresh_and_list(t0() + minutes(10)).await.unwrap();
    assert_eq!(records[0].temperature, 75.0);
    assert_eq!(provider.call_count(), 1);

    // stale again after expiry
    let records = orchestrator.refresh_and_list(t0() + minutes(31)).await.unwrap();
    let record = find(&records, austin);
    assert_eq!(record.temperature, 80.0);
    assert_eq!(record.expires_at, Some(t0() + minutes(61)));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_provider_failure_leaves_record_untouched() {
    let client = memory_client();
    let id = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();
    client.update_after_refresh(id, 70.0, t0()).await.unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider.clone());

    let later = t0() + minutes(45);
    let records = orchestrator.refresh_and_list(later).await.unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].temperature, 70.0);
    assert_eq!(records[0].expires_at, Some(t0() + minutes(30)));
    assert!(records[0].is_stale(later));
}

#[tokio::test]
async fn test_partial_failures_update_exactly_the_successes() {
    let client = memory_client();
    let austin = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();
    let paris = client.save("Paris", "", "FR", 48.85, 2.35).await.unwrap();
    let oslo = client.save("Oslo", "", "NO", 59.91, 10.75).await.unwrap();
    let tokyo = client.save("Tokyo", "", "JP", 35.68, 139.69).await.unwrap();

    // already fresh, must not be touched
    client.update_after_refresh(tokyo, 60.0, t0()).await.unwrap();

    // Paris fails
    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0), (59.91, 40.0), (35.68, 99.0)]));
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider.clone());

    let report = orchestrator.refresh_sweep(t0() + minutes(5)).await.unwrap();
    assert_eq!(report.refreshed, vec![austin, oslo]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, paris);
    assert_eq!(report.failed[0].kind, FailureKind::Provider);
    assert!(report.skipped.is_empty());

    // sequential, in store order, fresh record never requested
    let calls = provider.calls.lock().clone();
    assert_eq!(calls, vec![(30.27, -97.74), (48.85, 2.35), (59.91, 10.75)]);

    let records = client.list_all().await.unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(find(&records, austin).temperature, 75.0);
    assert_eq!(find(&records, oslo).temperature, 40.0);
    assert_eq!(find(&records, paris).temperature, 0.0);
    assert!(find(&records, paris).expires_at.is_none());
    assert_eq!(find(&records, tokyo).temperature, 60.0);
}

#[tokio::test]
async fn test_failed_record_is_retried_on_next_sweep() {
    let client = memory_client();
    let id = client.save("Paris", "", "FR", 48.85, 2.35).await.unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider.clone());

    let report = orchestrator.refresh_sweep(t0()).await.unwrap();
    assert_eq!(report.failed.len(), 1);

    // the failed attempt released its claim
    provider.set(48.85, 55.0);
    let report = orchestrator.refresh_sweep(t0()).await.unwrap();
    assert_eq!(report.refreshed, vec![id]);
}

#[tokio::test]
async fn test_update_failure_does_not_block_other_records() {
    let inner = SqliteLocationStore::in_memory().unwrap();
    let bad = inner.save("Austin", "TX", "US", 30.27, -97.74).unwrap();
    let good = inner.save("Oslo", "", "NO", 59.91, 10.75).unwrap();
    let mut store = FlakyStore::new(inner);
    store.fail_update_for = Some(bad);
    let client = LocationClient::new(store);

    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0), (59.91, 40.0)]));
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider);

    let report = orchestrator.refresh_sweep(t0()).await.unwrap();
    assert_eq!(report.refreshed, vec![good]);
    assert_eq!(report.failed[0].id, bad);
    assert_eq!(report.failed[0].kind, FailureKind::Store);

    let records = orchestrator.refresh_and_list(t0()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(find(&records, good).temperature, 40.0);
    assert_eq!(find(&records, bad).temperature, 0.0);
}

#[tokio::test]
async fn test_expired_scan_failure_aborts() {
    let inner = SqliteLocationStore::in_memory().unwrap();
    inner.save("Austin", "TX", "US", 30.27, -97.74).unwrap();
    let mut store = FlakyStore::new(inner);
    store.fail_list_expired = true;

    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0)]));
    let orchestrator = RefreshOrchestrator::new(LocationClient::new(store), provider.clone());

    let result = orchestrator.refresh_and_list(t0()).await;
    assert!(matches!(result, Err(LocationStoreError::Persistence(_))));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_list_all_failure_surfaces_after_refresh() {
    let inner = SqliteLocationStore::in_memory().unwrap();
    let id = inner.save("Austin", "TX", "US", 30.27, -97.74).unwrap();
    let mut store = FlakyStore::new(inner);
    store.fail_list_all = true;
    let client = LocationClient::new(store);

    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0)]));
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider);

    let result = orchestrator.refresh_and_list(t0()).await;
    assert!(matches!(result, Err(LocationStoreError::Persistence(_))));

    // the refresh itself still landed
    let record = client.get(id).await.unwrap().unwrap();
    assert_eq!(record.temperature, 75.0);
}

#[tokio::test]
async fn test_hanging_provider_times_out() {
    let client = memory_client();
    let id = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    let orchestrator = RefreshOrchestrator::new(client.clone(), Arc::new(HangingProvider))
        .with_provider_timeout(Duration::from_millis(50));

    let report = orchestrator.refresh_sweep(t0()).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, id);
    assert!(report.failed[0].reason.contains("timed out"));

    let record = client.get(id).await.unwrap().unwrap();
    assert!(record.expires_at.is_none());
}

#[tokio::test]
async fn test_concurrent_sweeps_call_provider_once() {
    let client = memory_client();
    let id = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    let provider = Arc::new(ScriptedProvider {
        delay: Some(Duration::from_millis(100)),
        ..ScriptedProvider::default()
    });
    provider.set(30.27, 75.0);

    let first = RefreshOrchestrator::new(client.clone(), provider.clone());
    let second = RefreshOrchestrator::new(client.clone(), provider.clone());

    let (a, b) = tokio::join!(first.refresh_sweep(t0()), second.refresh_sweep(t0()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(provider.call_count(), 1);
    let refreshed: Vec<i64> = a.refreshed.iter().chain(b.refreshed.iter()).copied().collect();
    assert_eq!(refreshed, vec![id]);
    assert!(a.failed.is_empty() && b.failed.is_empty());

    let record = client.get(id).await.unwrap().unwrap();
    assert_eq!(record.temperature, 75.0);
}

#[tokio::test]
async fn test_oversized_claim_setting_still_dedupes_sweeps() {
    let client = memory_client();
    let id = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    let provider = Arc::new(ScriptedProvider {
        delay: Some(Duration::from_millis(100)),
        ..ScriptedProvider::default()
    });
    provider.set(30.27, 75.0);

    let mut config = Config::default();
    config.refresh.claim_seconds = u64::MAX;
    let first = RefreshOrchestrator::from_config(client.clone(), provider.clone(), &config);
    let second = RefreshOrchestrator::from_config(client.clone(), provider.clone(), &config);

    let (a, b) = tokio::join!(first.refresh_sweep(t0()), second.refresh_sweep(t0()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(provider.call_count(), 1);
    assert_eq!(a.refreshed.len() + b.refreshed.len(), 1);
    assert_eq!(a.skipped.len() + b.skipped.len(), 1);
    assert_eq!(client.get(id).await.unwrap().unwrap().temperature, 75.0);
}

#[tokio::test]
async fn test_abandoned_claim_lapses() {
    let client = memory_client();
    let id = client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    // a sweep that died mid-refresh
    assert!(client.try_claim(id, t0(), chrono::Duration::seconds(60)).await.unwrap());

    let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0)]));
    let orchestrator = RefreshOrchestrator::new(client.clone(), provider.clone());

    let report = orchestrator.refresh_sweep(t0() + chrono::Duration::seconds(30)).await.unwrap();
    assert_eq!(report.skipped, vec![id]);
    assert_eq!(provider.call_count(), 0);

    let report = orchestrator.refresh_sweep(t0() + chrono::Duration::seconds(90)).await.unwrap();
    assert_eq!(report.refreshed, vec![id]);
}

#[tokio::test]
async fn test_delete_then_find_one() {
    let client = memory_client();
    client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

    let missing = client.delete(LocationKey::natural("Nowhere", "XX", "XX")).await;
    assert!(matches!(missing, Err(LocationStoreError::NotFound(_))));

    client.delete(LocationKey::natural("Austin", "TX", "US")).await.unwrap();
    assert!(client.find_one("Austin", "TX", "US").await.unwrap().is_none());
}

mod logging {
    use super::*;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_each_provider_failure_is_logged() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = memory_client();
        client.save("Paris", "", "FR", 48.85, 2.35).await.unwrap();
        client.save("Oslo", "", "NO", 59.91, 10.75).await.unwrap();
        client.save("Austin", "TX", "US", 30.27, -97.74).await.unwrap();

        let provider = Arc::new(ScriptedProvider::with(&[(30.27, 75.0)]));
        let orchestrator = RefreshOrchestrator::new(client, provider);

        let records = orchestrator.refresh_and_list(t0()).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(warnings.load(Ordering::SeqCst), 2);
    }
}
