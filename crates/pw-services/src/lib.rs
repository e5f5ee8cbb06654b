pub mod location;
pub mod location_backend;
pub mod location_client;
pub mod location_store;
pub mod refresh;
pub mod view;

pub use location::{refresh_ttl, LocationKey, LocationRecord};
pub use location_backend::{LocationStore, LocationStoreError, LocationStoreResult};
pub use location_client::LocationClient;
pub use location_store::SqliteLocationStore;
pub use refresh::{FailureKind, RefreshFailure, RefreshOrchestrator, RefreshReport};
pub use view::{build_views, LocationView};
