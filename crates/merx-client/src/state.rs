//! Last-known remote state of a reconciled resource.

use merx_core::ResourceKey;
use merx_tree::AttributeTree;

/// The last-known state of one remote resource instance.
///
/// Created on the first successful create (or import), replaced on every
/// successful update or read, and discarded on destroy. Owned exclusively by
/// a single reconciliation at a time; persistence between runs is the
/// external orchestrator's job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    /// Composite identity of the resource.
    pub key: ResourceKey,
    /// Last-known applied attribute tree.
    pub tree: AttributeTree,
    /// Monotonic optimistic-concurrency version, for kinds that carry one.
    /// Every update must send the version last observed by a successful
    /// read, never a stale one.
    pub version: Option<i64>,
}

impl ResourceState {
    /// Create a state record.
    pub fn new(key: ResourceKey, tree: AttributeTree, version: Option<i64>) -> Self {
        Self { key, tree, version }
    }
}
