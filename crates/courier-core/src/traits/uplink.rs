// # Uplink Trait
//
// Defines the interface for delivering batches to the remote collector.
//
// ## Implementations
//
// - HTTP collector API: `courier-uplink` crate
//
// ## Contract
//
// The uplink is the single choke point to the network and the only
// component aware of authentication and transport detail. Implementations:
//
// - Serialize one batch per call and issue exactly one request for it.
// - Attach credentials and transport headers internally; callers never see
//   them.
// - Return `Err` on any non-success status or transport failure. No retry,
//   no backoff: a failed batch is dropped by the caller and the overlapping
//   sweep window / the next watcher notice re-offers current data. That
//   implicit re-offer is the system's retry mechanism.
// - Never spawn tasks; dispatch concurrency is owned by the engine.

use async_trait::async_trait;

use crate::record::{DeviceIdentity, DeviceProfile, UploadBatch};

/// Trait for uplink implementations
///
/// Implementations must be thread-safe: the engine dispatches concurrent
/// sends for different batches through one shared uplink.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Register the device with the collector
    ///
    /// Sent once at agent start, before the first sweep. Registration is
    /// best-effort: the caller logs failures and proceeds.
    async fn register_device(
        &self,
        device: &DeviceIdentity,
        profile: &DeviceProfile,
    ) -> Result<(), crate::Error>;

    /// Deliver one batch to the endpoint for its record kind
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the collector accepted the batch
    /// - `Err(Error)`: delivery failed; the batch will not be retried
    async fn send(&self, batch: &UploadBatch) -> Result<(), crate::Error>;

    /// Get the uplink name (for logging/debugging)
    fn uplink_name(&self) -> &'static str;
}

/// Helper trait for constructing uplinks from configuration
pub trait UplinkFactory: Send + Sync {
    /// Create an Uplink instance from configuration
    fn create(
        &self,
        config: &crate::config::UplinkConfig,
    ) -> Result<std::sync::Arc<dyn Uplink>, crate::Error>;
}
