//! Async access to a blocking [`LocationStore`].
//!
//! Every call runs on tokio's blocking pool behind a mutex, so one store
//! connection can be shared by concurrent refresh sweeps.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::location::{LocationKey, LocationRecord};
use crate::location_backend::{LocationStore, LocationStoreError, LocationStoreResult};

#[derive(Clone)]
pub struct LocationClient {
    store: Arc<Mutex<Box<dyn LocationStore>>>,
}

impl LocationClient {
    pub fn new<S: LocationStore + 'static>(store: S) -> Self {
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    async fn run<T, F>(&self, op: F) -> LocationStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LocationStore) -> LocationStoreResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store.lock();
            op(&**guard)
        })
        .await
        .map_err(|e| LocationStoreError::Other(anyhow::anyhow!("Store task failed: {}", e)))?
    }

    pub async fn save(
        &self,
        city: &str,
        state: &str,
        country: &str,
        latitude: f64,
        longitude: f64,
    ) -> LocationStoreResult<i64> {
        let (city, state, country) = (city.to_string(), state.to_string(), country.to_string());
        self.run(move |s| s.save(&city, &state, &country, latitude, longitude))
            .await
    }

    pub async fn get(&self, id: i64) -> LocationStoreResult<Option<LocationRecord>> {
        self.run(move |s| s.get(id)).await
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> LocationStoreResult<Vec<LocationRecord>> {
        self.run(move |s| s.list_expired(now)).await
    }

    pub async fn list_all(&self) -> LocationStoreResult<Vec<LocationRecord>> {
        self.run(|s| s.list_all()).await
    }

    pub async fn update_after_refresh(
        &self,
        id: i64,
        temperature: f64,
        now: DateTime<Utc>,
    ) -> LocationStoreResult<()> {
        self.run(move |s| s.update_after_refresh(id, temperature, now))
            .await
    }

    pub async fn delete(&self, key: LocationKey) -> LocationStoreResult<()> {
        self.run(move |s| s.delete(&key)).await
    }

    pub async fn find_one(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> LocationStoreResult<Option<LocationRecord>> {
        let (city, state, country) = (city.to_string(), state.to_string(), country.to_string());
        self.run(move |s| s.find_one(&city, &state, &country)).await
    }

    pub async fn try_claim(
        &self,
        id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> LocationStoreResult<bool> {
        self.run(move |s| s.try_claim(id, now, ttl)).await
    }

    pub async fn release_claim(&self, id: i64) -> LocationStoreResult<()> {
        self.run(move |s| s.release_claim(id)).await
    }

    pub async fn count(&self) -> LocationStoreResult<usize> {
        self.run(|s| s.count()).await
    }
}

impl std::fmt::Debug for LocationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationClient").finish_non_exhaustive()
    }
}
