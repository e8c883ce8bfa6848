//! Per-tenant mutation locks.
//!
//! The remote API rejects concurrent mutations against the same tenant for
//! some resource kinds, so those calls are serialized here. The registry is
//! an arena: a concurrent map from tenant key to a lazily-constructed lock
//! handle with process-wide lifetime and no teardown.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use merx_core::TenantId;

/// Process-wide registry of per-tenant mutation locks.
///
/// Distinct tenants proceed fully in parallel; requests for the same tenant
/// are granted in arrival order (tokio's mutex queues waiters fairly). A
/// waiter cancelled while queued simply leaves the queue; the next waiter is
/// still granted the lock.
#[derive(Default)]
pub struct TenantLockRegistry {
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl TenantLockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutation lock for a tenant, creating it on first use.
    ///
    /// The guard releases the lock on drop, on every exit path.
    pub async fn lock(&self, tenant: &TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            let entry = self
                .locks
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        lock.lock_owned().await
    }

    /// Number of tenants with a materialized lock.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.locks.len()
    }
}
