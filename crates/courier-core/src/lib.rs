// # courier-core
//
// Core library for the courier collection-and-delivery agent.
//
// ## Architecture Overview
//
// This library provides the core functionality for harvesting records from
// local device data sources and delivering them to a remote collector:
// - **Collector**: Trait for sweeping one data source into normalized records
// - **WatchSource**: Trait for observing a live source's change notices
// - **Uplink**: Trait for delivering batches over the network
// - **PermissionGate**: Trait exposing host-owned capability grants
// - **IdentityStore**: Trait for durable storage of the device identifier
// - **AgentEngine**: Scheduler that drives sweeps and owns the watcher
// - **ChangeWatcher**: Forwards new rows from the live source, deduplicated
//   by an in-memory watermark
// - **ComponentRegistry**: Plugin-based registry for sources and uplinks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core policy is separate from source and
//    transport implementations
// 2. **Single Choke Point**: The uplink is the only component aware of
//    authentication and transport detail
// 3. **Silent Degradation**: No pipeline error is fatal; the agent delivers
//    fewer records rather than crashing
// 4. **At-Least-Once**: Local dedup (watermark) plus overlapping sweep
//    windows; the remote end deduplicates re-offered records

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod identity;
pub mod record;
pub mod registry;
pub mod state;
pub mod traits;
pub mod watcher;

// Re-export core types for convenience
pub use config::{AgentConfig, EngineConfig, IdentityStoreConfig, SourceConfig, TlsMode, UplinkConfig};
pub use engine::{AgentEngine, EngineEvent};
pub use error::{Error, Result};
pub use gate::StaticPermissionGate;
pub use identity::IdentityManager;
pub use record::{
    Capability, ChangeNotice, DeviceIdentity, DeviceProfile, HeadRecord, RecordKind,
    RecordPayload, RowId, SourceRecord, UploadBatch,
};
pub use registry::ComponentRegistry;
pub use state::{FileIdentityStore, MemoryIdentityStore};
pub use traits::{Collector, IdentityStore, PermissionGate, Uplink, WatchSource};
pub use watcher::{ChangeWatcher, WatcherHandle, WatcherState};
