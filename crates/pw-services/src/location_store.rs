//! SQLite-based location storage.
//!
//! Timestamps are stored as Unix microseconds (UTC) so `expires` and
//! `claimed_until` compare numerically. A NULL `expires` means the record has
//! never been refreshed and always counts as stale.

use chrono::{DateTime, Duration, Utc};
use pw_core::DatabaseError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::location::{refresh_ttl, LocationKey, LocationRecord};
use crate::location_backend::{
    validate_new_location, LocationStore, LocationStoreError, LocationStoreResult,
};

const SELECT_LOCATION: &str =
    "SELECT id, city, state, country, latitude, longitude, temp, expires FROM locations";

/// SQLite-based location storage.
pub struct SqliteLocationStore {
    conn: Connection,
}

impl SqliteLocationStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> LocationStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Unavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| DatabaseError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self { conn };
        store.init_schema()?;
        tracing::debug!("Opened location database at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (tests and throwaway runs).
    pub fn in_memory() -> LocationStoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> LocationStoreResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                latitude REAL NOT NULL DEFAULT 0.0,
                longitude REAL NOT NULL DEFAULT 0.0,
                temp REAL NOT NULL DEFAULT 0.0,
                expires INTEGER NULL,
                claimed_until INTEGER NULL
            );

            CREATE INDEX IF NOT EXISTS idx_locations_expires ON locations(expires);
            CREATE INDEX IF NOT EXISTS idx_locations_natural_key ON locations(city, state, country);
            "#,
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LocationRecord> {
        let expires: Option<i64> = row.get(7)?;
        Ok(LocationRecord {
            id: row.get(0)?,
            city: row.get(1)?,
            state: row.get(2)?,
            country: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            temperature: row.get(6)?,
            expires_at: expires.and_then(DateTime::from_timestamp_micros),
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> LocationStoreResult<Vec<LocationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

impl LocationStore for SqliteLocationStore {
    fn save(
        &self,
        city: &str,
        state: &str,
        country: &str,
        latitude: f64,
        longitude: f64,
    ) -> LocationStoreResult<i64> {
        validate_new_location(city, latitude, longitude)?;

        self.conn
            .execute(
                "INSERT INTO locations (city, state, country, latitude, longitude) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![city, state, country, latitude, longitude],
            )
            .map_err(|e| {
                tracing::error!(city, state, country, error = %e, "Failed to save location");
                LocationStoreError::from(e)
            })?;

        let id = self.conn.last_insert_rowid();
        tracing::info!(id, city, state, country, "Location saved");
        Ok(id)
    }

    fn get(&self, id: i64) -> LocationStoreResult<Option<LocationRecord>> {
        let sql = format!("{} WHERE id = ?1", SELECT_LOCATION);
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?)
    }

    fn list_expired(&self, now: DateTime<Utc>) -> LocationStoreResult<Vec<LocationRecord>> {
        let sql = format!(
            "{} WHERE expires IS NULL OR expires < ?1 ORDER BY id",
            SELECT_LOCATION
        );
        let records = self.query_records(&sql, params![to_micros(now)]).map_err(|e| {
            tracing::error!(error = %e, "Failed to list expired locations");
            e
        })?;
        tracing::debug!("Found {} expired locations", records.len());
        Ok(records)
    }

    fn list_all(&self) -> LocationStoreResult<Vec<LocationRecord>> {
        let sql = format!("{} ORDER BY id", SELECT_LOCATION);
        self.query_records(&sql, []).map_err(|e| {
            tracing::error!(error = %e, "Failed to list locations");
            e
        })
    }

    fn update_after_refresh(
        &self,
        id: i64,
        temperature: f64,
        now: DateTime<Utc>,
    ) -> LocationStoreResult<()> {
        let expires = now + refresh_ttl();
        let affected = self.conn.execute(
            "UPDATE locations SET temp = ?1, expires = ?2, claimed_until = NULL WHERE id = ?3",
            params![temperature, to_micros(expires), id],
        )?;

        if affected == 0 {
            tracing::warn!(id, "No location found to update");
            return Err(LocationStoreError::not_found(LocationKey::Id(id)));
        }

        tracing::debug!(id, temperature, %expires, "Location updated");
        Ok(())
    }

    fn delete(&self, key: &LocationKey) -> LocationStoreResult<()> {
        let affected = match key {
            LocationKey::Id(id) => {
                self.conn.execute("DELETE FROM locations WHERE id = ?1", params![id])?
            }
            LocationKey::Natural {
                city,
                state,
                country,
            } => self.conn.execute(
                "DELETE FROM locations WHERE id = (
                    SELECT id FROM locations
                    WHERE city = ?1 AND state = ?2 AND country = ?3
                    ORDER BY id LIMIT 1
                )",
                params![city, state, country],
            )?,
        };

        if affected == 0 {
            tracing::warn!(key = %key, "No location found to delete");
            return Err(LocationStoreError::not_found(key));
        }

        tracing::info!(key = %key, "Location deleted");
        Ok(())
    }

    fn find_one(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> LocationStoreResult<Option<LocationRecord>> {
        let sql = format!(
            "{} WHERE city = ?1 AND state = ?2 AND country = ?3 ORDER BY id LIMIT 1",
            SELECT_LOCATION
        );
        let found = self
            .conn
            .query_row(&sql, params![city, state, country], Self::row_to_record)
            .optional()?;

        if found.is_none() {
            tracing::debug!(city, state, country, "No location found");
        }
        Ok(found)
    }

    fn try_claim(&self, id: i64, now: DateTime<Utc>, ttl: Duration) -> LocationStoreResult<bool> {
        let now_micros = to_micros(now);
        let affected = self.conn.execute(
            "UPDATE locations SET claimed_until = ?1
             WHERE id = ?2
               AND (expires IS NULL OR expires < ?3)
               AND (claimed_until IS NULL OR claimed_until < ?3)",
            params![to_micros(now + ttl), id, now_micros],
        )?;
        Ok(affected == 1)
    }

    fn release_claim(&self, id: i64) -> LocationStoreResult<()> {
        self.conn.execute(
            "UPDATE locations SET claimed_until = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn count(&self) -> LocationStoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
