//! Architectural Contract Test: Identity Stability
//!
//! Constraints verified:
//! - `get_or_create` returns the same value for every call in a process
//! - The persisted value survives a simulated restart (fresh manager over
//!   the same file)
//! - A broken store degrades to an ephemeral identity without failing
//!
//! If this test fails, one installation can appear as many devices.

use async_trait::async_trait;
use courier_core::record::DeviceIdentity;
use courier_core::state::FileIdentityStore;
use courier_core::traits::IdentityStore;
use courier_core::{Error, IdentityManager, Result};

/// A store whose reads and writes always fail
struct BrokenIdentityStore;

#[async_trait]
impl IdentityStore for BrokenIdentityStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        Err(Error::identity("scripted read failure"))
    }

    async fn store(&self, _identity: &DeviceIdentity) -> Result<()> {
        Err(Error::identity("scripted write failure"))
    }
}

/// A store that loads fine but cannot persist
struct WriteOnlyBrokenStore;

#[async_trait]
impl IdentityStore for WriteOnlyBrokenStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        Ok(None)
    }

    async fn store(&self, _identity: &DeviceIdentity) -> Result<()> {
        Err(Error::identity("scripted write failure"))
    }
}

#[tokio::test]
async fn identity_is_stable_across_simulated_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");

    let first = {
        let store = FileIdentityStore::new(&path).await.unwrap();
        let manager = IdentityManager::new(Box::new(store));

        let a = manager.get_or_create().await;
        let b = manager.get_or_create().await;
        assert_eq!(a, b, "same process must see one identity");
        a
    };

    // Fresh store + manager over the same path simulates a process restart.
    let store = FileIdentityStore::new(&path).await.unwrap();
    let manager = IdentityManager::new(Box::new(store));
    let after_restart = manager.get_or_create().await;

    assert_eq!(first, after_restart, "identity must survive restarts");
}

#[tokio::test]
async fn unreadable_store_degrades_to_ephemeral_identity() {
    let manager = IdentityManager::new(Box::new(BrokenIdentityStore));

    // Never fails; the identity just won't survive a restart.
    let a = manager.get_or_create().await;
    let b = manager.get_or_create().await;
    assert_eq!(a, b, "ephemeral identity is still stable in-process");
}

#[tokio::test]
async fn unwritable_store_degrades_to_ephemeral_identity() {
    let manager = IdentityManager::new(Box::new(WriteOnlyBrokenStore));

    let a = manager.get_or_create().await;
    let b = manager.get_or_create().await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn concurrent_first_calls_agree_on_one_identity() {
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let store = FileIdentityStore::new(dir.path().join("identity.json"))
        .await
        .unwrap();
    let manager = Arc::new(IdentityManager::new(Box::new(store)));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_or_create().await })
        })
        .collect();

    let mut identities = Vec::new();
    for task in tasks {
        identities.push(task.await.unwrap());
    }

    identities.dedup();
    assert_eq!(identities.len(), 1, "one guarded critical section, one id");
}
