// # Collector Trait
//
// Defines the interface for extracting normalized records from one data
// source during a full sweep.
//
// ## Implementations
//
// - SQLite device store: `courier-source-sqlite` crate (one collector per
//   record kind)
//
// ## Contract
//
// - Check the permission gate for the collector's capability FIRST; if the
//   capability is denied, return `Harvest::Skipped` (not an error).
// - Queries are time-windowed: only rows newer than `ctx.window_start()` are
//   considered, bounding work and payload size.
// - Per-row failures (malformed row, decode error) are skipped with a
//   diagnostic and MUST NOT abort the collector.
// - Return `Err` only when the underlying source cannot be opened at all.
//
// Collectors are observers: they never upload, never retry, and never cache
// permission state beyond the single pass they were invoked for.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::record::{Capability, DeviceIdentity, RecordKind, SourceRecord};
use crate::traits::permission_gate::PermissionGate;

/// Per-pass context handed to every collector
///
/// The context is constructed fresh for each sweep; in particular the
/// permission gate reference is re-read through on every pass and never
/// cached across sweeps.
pub struct CollectContext<'a> {
    /// Identity stamped onto every record
    pub device: &'a DeviceIdentity,
    /// Host-owned capability grants
    pub gate: &'a dyn PermissionGate,
    /// Wall-clock time of the sweep
    pub now: DateTime<Utc>,
    /// Recent-history horizon
    pub lookback: Duration,
}

impl CollectContext<'_> {
    /// Start of the collection window (`now − lookback`)
    pub fn window_start(&self) -> DateTime<Utc> {
        self.now - self.lookback
    }
}

/// Outcome of one collection pass over one source
#[derive(Debug, Clone, PartialEq)]
pub enum Harvest {
    /// Normalized records, newest first (possibly empty)
    Records(Vec<SourceRecord>),
    /// The capability was denied; nothing was read
    Skipped,
}

/// Trait for source collector implementations
///
/// Implementations must be thread-safe; the engine invokes collectors from
/// its sweep task and may hold them across sweeps.
#[async_trait]
pub trait Collector: Send + Sync {
    /// The capability gating this collector
    fn capability(&self) -> Capability;

    /// The record kind this collector produces
    fn kind(&self) -> RecordKind;

    /// Short source name for logging/diagnostics
    fn source_name(&self) -> &'static str;

    /// Run one collection pass
    ///
    /// # Returns
    ///
    /// - `Ok(Harvest::Records(..))`: normalized records in the window
    /// - `Ok(Harvest::Skipped)`: capability denied for this pass
    /// - `Err(Error)`: the source itself is unavailable
    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest, crate::Error>;
}

/// Helper trait for constructing a source's collectors and watch source from
/// configuration
pub trait SourceFactory: Send + Sync {
    /// Create the full set of collectors this source provides
    fn create_collectors(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Vec<Box<dyn Collector>>, crate::Error>;

    /// Create the watch source for the source's live table, if it has one
    ///
    /// The device identity is passed so the watch source can stamp the
    /// records it normalizes from head queries.
    fn create_watch_source(
        &self,
        config: &crate::config::SourceConfig,
        device: &DeviceIdentity,
    ) -> Result<std::sync::Arc<dyn crate::traits::WatchSource>, crate::Error>;
}
