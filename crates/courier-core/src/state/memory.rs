// # Memory Identity Store
//
// In-memory implementation of IdentityStore.
//
// ## Crash Behavior
//
// - The identifier is lost on restart/crash
// - The next run generates a fresh identifier (the collector sees a "new"
//   device)
//
// ## When to Use
//
// - Testing environments
// - Throwaway or containerized deployments where a per-run identity is
//   acceptable

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::record::DeviceIdentity;
use crate::traits::IdentityStore;

/// In-memory identity store implementation
///
/// Clones share the same slot, which lets tests simulate a restart by
/// handing the same store to a fresh `IdentityManager`.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    inner: Arc<RwLock<Option<DeviceIdentity>>>,
}

impl MemoryIdentityStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.clone())
    }

    async fn store(&self, identity: &DeviceIdentity) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard = Some(identity.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let store = MemoryIdentityStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        let identity = DeviceIdentity::generate();
        store.store(&identity).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(identity));
    }
}
