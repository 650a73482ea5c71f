//! Plugin-based component registry
//!
//! The registry allows data sources, uplinks, and identity stores to be
//! registered dynamically at runtime, avoiding hardcoded if-else chains in
//! the daemon.
//!
//! ## Registration
//!
//! Implementation crates provide a `register()` function called during
//! daemon initialization:
//!
//! ```rust,ignore
//! // In courier-uplink
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_uplink("http", Box::new(HttpUplinkFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{IdentityStoreConfig, SourceConfig, UplinkConfig};
use crate::error::{Error, Result};
use crate::record::DeviceIdentity;
use crate::traits::{
    Collector, IdentityStore, IdentityStoreFactory, SourceFactory, Uplink, UplinkFactory,
    WatchSource,
};

/// Component registry for plugin-based construction
///
/// Maintains maps from type names to factory objects, allowing dynamic
/// instantiation based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Registered source factories
    sources: RwLock<HashMap<String, Box<dyn SourceFactory>>>,

    /// Registered uplink factories
    uplinks: RwLock<HashMap<String, Box<dyn UplinkFactory>>>,

    /// Registered identity store factories
    identity_stores: RwLock<HashMap<String, Arc<dyn IdentityStoreFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source factory
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn SourceFactory>) {
        let mut sources = self.sources.write().unwrap();
        sources.insert(name.into(), factory);
    }

    /// Register an uplink factory
    pub fn register_uplink(&self, name: impl Into<String>, factory: Box<dyn UplinkFactory>) {
        let mut uplinks = self.uplinks.write().unwrap();
        uplinks.insert(name.into(), factory);
    }

    /// Register an identity store factory
    pub fn register_identity_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn IdentityStoreFactory>,
    ) {
        let mut stores = self.identity_stores.write().unwrap();
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create the collectors of a source from configuration
    pub fn create_collectors(&self, config: &SourceConfig) -> Result<Vec<Box<dyn Collector>>> {
        let sources = self.sources.read().unwrap();
        let factory = sources
            .get(config.type_name())
            .ok_or_else(|| Error::config(format!("unknown source type: {}", config.type_name())))?;
        factory.create_collectors(config)
    }

    /// Create the watch source of a source from configuration
    pub fn create_watch_source(
        &self,
        config: &SourceConfig,
        device: &DeviceIdentity,
    ) -> Result<Arc<dyn WatchSource>> {
        let sources = self.sources.read().unwrap();
        let factory = sources
            .get(config.type_name())
            .ok_or_else(|| Error::config(format!("unknown source type: {}", config.type_name())))?;
        factory.create_watch_source(config, device)
    }

    /// Create an uplink from configuration
    pub fn create_uplink(&self, config: &UplinkConfig) -> Result<Arc<dyn Uplink>> {
        let uplinks = self.uplinks.read().unwrap();
        let factory = uplinks
            .get(config.type_name())
            .ok_or_else(|| Error::config(format!("unknown uplink type: {}", config.type_name())))?;
        factory.create(config)
    }

    /// Create an identity store from configuration
    pub async fn create_identity_store(
        &self,
        config: &IdentityStoreConfig,
    ) -> Result<Box<dyn IdentityStore>> {
        let store_type = match config {
            IdentityStoreConfig::File { .. } => "file",
            IdentityStoreConfig::Memory => "memory",
            IdentityStoreConfig::Custom { factory, .. } => factory,
        };

        let factory = {
            let stores = self.identity_stores.read().unwrap();
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("unknown identity store type: {}", store_type)))?
                .clone()
            // Lock released here, before the async create
        };

        factory.create(config).await
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        self.sources.read().unwrap().keys().cloned().collect()
    }

    /// List all registered uplink types
    pub fn list_uplinks(&self) -> Vec<String> {
        self.uplinks.read().unwrap().keys().cloned().collect()
    }

    /// List all registered identity store types
    pub fn list_identity_stores(&self) -> Vec<String> {
        self.identity_stores.read().unwrap().keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        self.sources.read().unwrap().contains_key(name)
    }

    /// Check if an uplink type is registered
    pub fn has_uplink(&self, name: &str) -> bool {
        self.uplinks.read().unwrap().contains_key(name)
    }

    /// Check if an identity store type is registered
    pub fn has_identity_store(&self, name: &str) -> bool {
        self.identity_stores.read().unwrap().contains_key(name)
    }
}

/// Built-in factory for the identity stores shipped with courier-core
pub struct BuiltinIdentityStoreFactory;

#[async_trait::async_trait]
impl IdentityStoreFactory for BuiltinIdentityStoreFactory {
    async fn create(&self, config: &IdentityStoreConfig) -> Result<Box<dyn IdentityStore>> {
        match config {
            IdentityStoreConfig::File { path } => {
                let store = crate::state::FileIdentityStore::new(path).await?;
                Ok(Box::new(store))
            }
            IdentityStoreConfig::Memory => {
                Ok(Box::new(crate::state::MemoryIdentityStore::new()))
            }
            IdentityStoreConfig::Custom { factory, .. } => Err(Error::config(format!(
                "identity store factory '{}' is not built in",
                factory
            ))),
        }
    }
}

/// Register the built-in identity stores with a registry
pub fn register_builtin_identity_stores(registry: &ComponentRegistry) {
    registry.register_identity_store("file", Box::new(BuiltinIdentityStoreFactory));
    registry.register_identity_store("memory", Box::new(BuiltinIdentityStoreFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockUplinkFactory;

    impl UplinkFactory for MockUplinkFactory {
        fn create(&self, _config: &UplinkConfig) -> Result<Arc<dyn Uplink>> {
            Err(Error::config("mock uplink not implemented"))
        }
    }

    #[test]
    fn registry_registration() {
        let registry = ComponentRegistry::new();

        assert!(!registry.has_uplink("mock"));

        registry.register_uplink("mock", Box::new(MockUplinkFactory));

        assert!(registry.has_uplink("mock"));
        assert!(registry.list_uplinks().contains(&"mock".to_string()));
    }

    #[tokio::test]
    async fn builtin_identity_stores_resolve() {
        let registry = ComponentRegistry::new();
        register_builtin_identity_stores(&registry);

        let store = registry
            .create_identity_store(&IdentityStoreConfig::Memory)
            .await;
        assert!(store.is_ok());

        let unknown = registry
            .create_identity_store(&IdentityStoreConfig::Custom {
                factory: "nope".to_string(),
                config: serde_json::json!({}),
            })
            .await;
        assert!(unknown.is_err());
    }
}
