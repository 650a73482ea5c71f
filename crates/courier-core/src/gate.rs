//! Config-driven permission gate
//!
//! Grants are injected at construction from explicit configuration and can
//! be changed at runtime through [`StaticPermissionGate::set`]; there are no
//! process-wide toggles. Collectors read through the gate on every pass, so
//! a revocation takes effect on the next pass that checks it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::record::Capability;
use crate::traits::PermissionGate;

/// Permission gate backed by an explicit grant table
///
/// Capabilities absent from the table are treated as denied. The gate is
/// cheaply cloneable; clones share the same grant table, which lets a host
/// (or a test) revoke a capability while the engine is running.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionGate {
    grants: Arc<RwLock<HashMap<Capability, bool>>>,
}

impl StaticPermissionGate {
    /// Create a gate with every capability denied
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate from an explicit grant table
    pub fn from_grants(grants: HashMap<Capability, bool>) -> Self {
        Self {
            grants: Arc::new(RwLock::new(grants)),
        }
    }

    /// Create a gate granting exactly the given capabilities
    pub fn granting(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let grants = capabilities.into_iter().map(|c| (c, true)).collect();
        Self::from_grants(grants)
    }

    /// Grant or revoke a capability
    pub fn set(&self, capability: Capability, granted: bool) {
        let mut grants = self.grants.write().unwrap();
        grants.insert(capability, granted);
    }
}

impl PermissionGate for StaticPermissionGate {
    fn is_granted(&self, capability: Capability) -> bool {
        let grants = self.grants.read().unwrap();
        grants.get(&capability).copied().unwrap_or(false)
    }
}
