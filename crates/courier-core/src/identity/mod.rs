//! Device identity management
//!
//! One installation gets one stable pseudo-random identifier. The manager
//! implements a single strategy (read-persisted-or-generate-and-persist)
//! inside one guarded critical section, so concurrent first calls cannot
//! race two different identifiers into existence. The identifier is never
//! lazily re-derived after that.
//!
//! ## Failure mode
//!
//! If the durable store cannot be read or written, the manager falls back to
//! a fresh random identifier held for the current process lifetime only.
//! This breaks cross-restart stability (a known, accepted precision loss)
//! but never fails the caller.

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::record::DeviceIdentity;
use crate::traits::IdentityStore;

/// Manages the per-installation device identifier
pub struct IdentityManager {
    store: Box<dyn IdentityStore>,
    cached: Mutex<Option<DeviceIdentity>>,
}

impl IdentityManager {
    /// Create a manager over a durable store
    pub fn new(store: Box<dyn IdentityStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Get the installation's identifier, creating and persisting it on the
    /// first call
    ///
    /// Subsequent calls (including across restarts, via the durable store)
    /// return the same value. Never fails: persistence errors degrade to an
    /// ephemeral identity for this process.
    pub async fn get_or_create(&self) -> DeviceIdentity {
        let mut cached = self.cached.lock().await;

        if let Some(identity) = cached.as_ref() {
            return identity.clone();
        }

        let identity = match self.store.load().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                let fresh = DeviceIdentity::generate();
                match self.store.store(&fresh).await {
                    Ok(()) => info!(device = %fresh, "generated and persisted device identity"),
                    Err(e) => {
                        warn!(error = %e, "identity persistence unavailable, using ephemeral identity");
                    }
                }
                fresh
            }
            Err(e) => {
                let fresh = DeviceIdentity::generate();
                warn!(error = %e, "identity store unreadable, using ephemeral identity");
                fresh
            }
        };

        *cached = Some(identity.clone());
        identity
    }
}
