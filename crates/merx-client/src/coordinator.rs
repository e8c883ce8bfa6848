//! Reconciliation coordinator.
//!
//! Drives one reconciliation through its phases: acquire a token, take the
//! tenant lock when the resource kind requires it, compute the patch,
//! dispatch through the gateway, and merge the response into a fresh tree.
//! The tenant lock is released on every exit path (guard drop), and the
//! whole run is bounded by the caller's deadline.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::gateway::ApiGateway;
use crate::lock::TenantLockRegistry;
use crate::state::ResourceState;
use crate::token::TokenCache;
use merx_core::{ResourceKey, ResourceKindSpec, TenantContext};
use merx_tree::{diff, AttributeTree, ResourceSchema};

/// Default deadline for a single reconciliation.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Phase of a reconciliation run.
///
/// `Start → TokenAcquired → (LockAcquired) → PatchComputed → Dispatched →
/// Applied | Failed`. Read-only operations skip `PatchComputed`; an empty
/// patch short-circuits from `PatchComputed` to `Applied` without a network
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start = 0,
    TokenAcquired = 1,
    LockAcquired = 2,
    PatchComputed = 3,
    Dispatched = 4,
    Applied = 5,
    Failed = 6,
}

impl Phase {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::TokenAcquired => "token_acquired",
            Phase::LockAcquired => "lock_acquired",
            Phase::PatchComputed => "patch_computed",
            Phase::Dispatched => "dispatched",
            Phase::Applied => "applied",
            Phase::Failed => "failed",
        }
    }

    fn from_u8(raw: u8) -> Phase {
        match raw {
            1 => Phase::TokenAcquired,
            2 => Phase::LockAcquired,
            3 => Phase::PatchComputed,
            4 => Phase::Dispatched,
            5 => Phase::Applied,
            6 => Phase::Failed,
            _ => Phase::Start,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase tracker shared between a running reconciliation and its deadline
/// wrapper, so a timeout can report where the run was cut off.
struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(Phase::Start as u8))
    }

    fn set(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::SeqCst);
        debug!(phase = %phase, "reconciliation phase");
    }

    fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Orchestrates reconciliations against an injected [`ApiGateway`].
///
/// The token cache and lock registry are process-wide and shared across all
/// concurrent reconciliations; each run's trees and state are owned by that
/// run alone.
pub struct ReconciliationCoordinator<G> {
    gateway: Arc<G>,
    tokens: Arc<TokenCache>,
    locks: Arc<TenantLockRegistry>,
    deadline: Duration,
}

impl<G: ApiGateway> ReconciliationCoordinator<G> {
    /// Create a coordinator with the default deadline and a fresh lock
    /// registry.
    pub fn new(gateway: Arc<G>, tokens: Arc<TokenCache>) -> Self {
        Self {
            gateway,
            tokens,
            locks: Arc::new(TenantLockRegistry::new()),
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Override the per-run deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Share a lock registry with other coordinators in the process.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<TenantLockRegistry>) -> Self {
        self.locks = locks;
        self
    }

    /// The lock registry serializing this coordinator's mutations.
    #[must_use]
    pub fn locks(&self) -> &Arc<TenantLockRegistry> {
        &self.locks
    }

    /// Create the remote resource from the full desired tree.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        key: ResourceKey,
        desired: AttributeTree,
    ) -> ReconcileResult<ResourceState> {
        let phase = PhaseCell::new();
        let result = match timeout(
            self.deadline,
            self.create_inner(ctx, kind, &key, &desired, &phase),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Cancelled { phase: phase.get() }),
        };
        self.finish(ctx, "create", &key, &phase, result)
    }

    /// Compute and apply the minimal patch turning `state` into `desired`.
    ///
    /// An empty patch short-circuits to applied without a network call.
    pub async fn update(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        state: &ResourceState,
        desired: AttributeTree,
    ) -> ReconcileResult<ResourceState> {
        let phase = PhaseCell::new();
        let result = match timeout(
            self.deadline,
            self.update_inner(ctx, kind, state, &desired, &phase),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Cancelled { phase: phase.get() }),
        };
        self.finish(ctx, "update", &state.key, &phase, result)
    }

    /// Re-read the remote resource. Never takes the tenant lock.
    pub async fn refresh(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        key: ResourceKey,
        schema: &Arc<ResourceSchema>,
    ) -> ReconcileResult<ResourceState> {
        let phase = PhaseCell::new();
        let result = match timeout(
            self.deadline,
            self.refresh_inner(ctx, kind, &key, schema, &phase),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Cancelled { phase: phase.get() }),
        };
        self.finish(ctx, "refresh", &key, &phase, result)
    }

    /// Bootstrap state from an existing remote resource via its composite
    /// import identifier (e.g. `site:zone_id:method_id`).
    pub async fn import(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        composite: &str,
        schema: &Arc<ResourceSchema>,
    ) -> ReconcileResult<ResourceState> {
        let key = kind.parse_import(composite)?;
        self.refresh(ctx, kind, key, schema).await
    }

    /// Destroy the resource per the kind's delete policy. Local state is
    /// discarded by the caller either way.
    pub async fn destroy(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        state: &ResourceState,
    ) -> ReconcileResult<()> {
        let phase = PhaseCell::new();
        let result = match timeout(
            self.deadline,
            self.destroy_inner(ctx, kind, state, &phase),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Cancelled { phase: phase.get() }),
        };
        self.finish(ctx, "destroy", &state.key, &phase, result)
    }

    async fn create_inner(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        key: &ResourceKey,
        desired: &AttributeTree,
        phase: &PhaseCell,
    ) -> ReconcileResult<ResourceState> {
        self.tokens.get(ctx).await?;
        phase.set(Phase::TokenAcquired);

        let _guard = self.maybe_lock(ctx, kind, phase).await;

        let path = kind.path_for(key)?;
        let body = desired.to_json();
        phase.set(Phase::PatchComputed);

        phase.set(Phase::Dispatched);
        let document = self.gateway.create(ctx, &path, body).await?;

        let tree = AttributeTree::from_remote(&document.body, desired.schema())?;
        phase.set(Phase::Applied);
        Ok(ResourceState::new(key.clone(), tree, document.version))
    }

    async fn update_inner(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        state: &ResourceState,
        desired: &AttributeTree,
        phase: &PhaseCell,
    ) -> ReconcileResult<ResourceState> {
        self.tokens.get(ctx).await?;
        phase.set(Phase::TokenAcquired);

        let _guard = self.maybe_lock(ctx, kind, phase).await;

        let patch = diff(&state.tree, desired)?;
        phase.set(Phase::PatchComputed);

        if patch.is_empty() {
            debug!(tenant = %ctx.tenant, resource = %state.key, "no changes; skipping update call");
            phase.set(Phase::Applied);
            return Ok(state.clone());
        }

        debug!(
            tenant = %ctx.tenant,
            resource = %state.key,
            entries = patch.entry_count(),
            paths = ?patch.paths(),
            "computed patch"
        );

        let path = kind.path_for(&state.key)?;
        phase.set(Phase::Dispatched);
        let document = self
            .gateway
            .patch(ctx, &path, patch.to_body(), state.version)
            .await?;

        let tree = AttributeTree::from_remote(&document.body, desired.schema())?;
        phase.set(Phase::Applied);
        Ok(ResourceState::new(
            state.key.clone(),
            tree,
            document.version,
        ))
    }

    async fn refresh_inner(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        key: &ResourceKey,
        schema: &Arc<ResourceSchema>,
        phase: &PhaseCell,
    ) -> ReconcileResult<ResourceState> {
        self.tokens.get(ctx).await?;
        phase.set(Phase::TokenAcquired);

        let path = kind.path_for(key)?;
        phase.set(Phase::Dispatched);
        let document = self.gateway.read(ctx, &path).await?;

        let tree = AttributeTree::from_remote(&document.body, schema)?;
        phase.set(Phase::Applied);
        Ok(ResourceState::new(key.clone(), tree, document.version))
    }

    async fn destroy_inner(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        state: &ResourceState,
        phase: &PhaseCell,
    ) -> ReconcileResult<()> {
        if !kind.delete_policy.deletes_remote() {
            debug!(
                tenant = %ctx.tenant,
                resource = %state.key,
                "delete policy is detach; leaving remote resource in place"
            );
            phase.set(Phase::Applied);
            return Ok(());
        }

        self.tokens.get(ctx).await?;
        phase.set(Phase::TokenAcquired);

        let _guard = self.maybe_lock(ctx, kind, phase).await;

        let path = kind.path_for(&state.key)?;
        phase.set(Phase::Dispatched);
        self.gateway.delete(ctx, &path).await?;
        phase.set(Phase::Applied);
        Ok(())
    }

    async fn maybe_lock(
        &self,
        ctx: &TenantContext,
        kind: &ResourceKindSpec,
        phase: &PhaseCell,
    ) -> Option<OwnedMutexGuard<()>> {
        if !kind.serialize_mutations {
            return None;
        }
        let guard = self.locks.lock(&ctx.tenant).await;
        phase.set(Phase::LockAcquired);
        Some(guard)
    }

    fn finish<T>(
        &self,
        ctx: &TenantContext,
        operation: &'static str,
        key: &ResourceKey,
        phase: &PhaseCell,
        result: ReconcileResult<T>,
    ) -> ReconcileResult<T> {
        match &result {
            Ok(_) => {
                info!(tenant = %ctx.tenant, resource = %key, operation, "reconciliation applied");
            }
            Err(error) => {
                phase.set(Phase::Failed);
                warn!(
                    tenant = %ctx.tenant,
                    resource = %key,
                    operation,
                    code = error.error_code(),
                    error = %error,
                    "reconciliation failed"
                );
            }
        }
        result
    }
}
