// # SQLite Device Sources
//
// This crate provides the SQLite-backed data sources for the courier agent:
// sweep collectors for every record kind and the change-driven watch source
// over the live call log.
//
// ## Purpose
//
// The device store is the concrete stand-in for the host's provider APIs.
// Its insert methods are the collaborator interface the host runtime feeds;
// collectors and the watch source only ever read. Inserting into the watched
// call log broadcasts a change notice to subscribers, the way a content
// observer would be poked by the platform.
//
// ## Architecture
//
// - `DeviceStore`: schema, insert API, windowed queries, notice channel
// - collectors: one per record kind, gate-checked, per-row failure isolation
// - `CallLogWatchSource`: head query + event-driven notice stream
//
// Collectors and the watch source created by one factory share one store, so
// host inserts are visible to both paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use courier_core::config::SourceConfig;
use courier_core::record::DeviceIdentity;
use courier_core::traits::{Collector, SourceFactory, WatchSource};
use courier_core::{ComponentRegistry, Error, Result};

pub mod collectors;
pub mod store;
pub mod watch;

pub use collectors::{
    AppMessageCollector, CallLogCollector, ImageCollector, LocationCollector, MessageCollector,
};
pub use store::DeviceStore;
pub use watch::CallLogWatchSource;

/// Factory for SQLite-backed sources
///
/// Stores are cached per path so the collectors and the watch source built
/// from one configuration share a single store (and its notice channel).
#[derive(Default)]
pub struct SqliteSourceFactory {
    stores: Mutex<HashMap<String, Arc<DeviceStore>>>,
}

impl SqliteSourceFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&self, config: &SourceConfig) -> Result<Arc<DeviceStore>> {
        let path = match config {
            SourceConfig::Sqlite { path } => path.clone(),
            _ => return Err(Error::config("invalid config for SQLite source")),
        };

        let mut stores = self.stores.lock().unwrap();
        if let Some(store) = stores.get(&path) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(DeviceStore::open(&path)?);
        stores.insert(path, Arc::clone(&store));
        Ok(store)
    }
}

impl SourceFactory for SqliteSourceFactory {
    fn create_collectors(&self, config: &SourceConfig) -> Result<Vec<Box<dyn Collector>>> {
        let store = self.store_for(config)?;
        Ok(collectors::collectors(store))
    }

    fn create_watch_source(
        &self,
        config: &SourceConfig,
        device: &DeviceIdentity,
    ) -> Result<Arc<dyn WatchSource>> {
        let store = self.store_for(config)?;
        Ok(Arc::new(CallLogWatchSource::new(store, device.clone())))
    }
}

/// Register the SQLite source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_source("sqlite", Box::new(SqliteSourceFactory::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_shares_one_store_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.db");
        let config = SourceConfig::Sqlite {
            path: path.to_string_lossy().into_owned(),
        };

        let factory = SqliteSourceFactory::new();
        let collectors = factory.create_collectors(&config).unwrap();
        assert_eq!(collectors.len(), 5);

        let device = DeviceIdentity::new("dev");
        let watch = factory.create_watch_source(&config, &device);
        assert!(watch.is_ok());

        // One cached store behind both calls.
        assert_eq!(factory.stores.lock().unwrap().len(), 1);
    }

    #[test]
    fn factory_rejects_foreign_config() {
        let factory = SqliteSourceFactory::new();
        let config = SourceConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::json!({}),
        };
        assert!(factory.create_collectors(&config).is_err());
    }
}
