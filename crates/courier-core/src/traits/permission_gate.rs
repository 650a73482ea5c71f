// # Permission Gate Trait
//
// Exposes the host's capability grants to the pipeline.
//
// ## Contract
//
// `is_granted` is a pure read of host-provided state. Grants may change
// between sweeps; callers must re-evaluate on every collection pass and
// never cache a grant beyond the pass it was read for. A capability revoked
// mid-run stops that source's collection for the pass.

use crate::record::Capability;

/// Trait for host-provided capability grants
pub trait PermissionGate: Send + Sync {
    /// Whether the capability is currently granted
    fn is_granted(&self, capability: Capability) -> bool;
}
