// # Identity Store Trait
//
// Defines the durable key-value interface backing the device identifier.
//
// ## Purpose
//
// The identifier must be identical across the lifetime of one installation,
// surviving arbitrary process kills and restarts. The store only has to hold
// one value; the read-or-generate policy lives in `identity::IdentityManager`.
//
// ## Implementations
//
// - File-based with atomic writes and backup recovery: `state::FileIdentityStore`
// - In-memory (tests, throwaway deployments): `state::MemoryIdentityStore`

use async_trait::async_trait;

use crate::record::DeviceIdentity;

/// Trait for durable identity storage
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the persisted identifier, if any
    ///
    /// # Returns
    ///
    /// - `Ok(Some(identity))`: a previously persisted identifier
    /// - `Ok(None)`: nothing persisted yet (first run)
    /// - `Err(Error)`: the store could not be read
    async fn load(&self) -> Result<Option<DeviceIdentity>, crate::Error>;

    /// Persist the identifier
    ///
    /// Must be durable before returning: a process kill immediately after
    /// `store` returns must not lose the value.
    async fn store(&self, identity: &DeviceIdentity) -> Result<(), crate::Error>;
}

/// Helper trait for constructing identity stores from configuration
#[async_trait]
pub trait IdentityStoreFactory: Send + Sync {
    /// Create an IdentityStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::IdentityStoreConfig,
    ) -> Result<Box<dyn IdentityStore>, crate::Error>;
}
