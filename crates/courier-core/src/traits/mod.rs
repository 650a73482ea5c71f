//! Core trait definitions
//!
//! These traits define the seams between the pipeline and its collaborators:
//! data sources, the remote collector, the host's permission surface, and
//! durable storage for the device identifier.

pub mod collector;
pub mod identity_store;
pub mod permission_gate;
pub mod uplink;
pub mod watch_source;

pub use collector::{CollectContext, Collector, Harvest, SourceFactory};
pub use identity_store::{IdentityStore, IdentityStoreFactory};
pub use permission_gate::PermissionGate;
pub use uplink::{Uplink, UplinkFactory};
pub use watch_source::WatchSource;
