//! # Merx client
//!
//! The reconciliation side of Merx: a single-flight token cache, the
//! per-tenant mutation lock registry, the API gateway boundary with its HTTP
//! implementation, and the coordinator that drives one reconciliation from
//! desired tree to applied state.
//!
//! ## Architecture
//!
//! The external orchestrator supplies desired configuration and, on update,
//! the previously recorded [`ResourceState`]. The coordinator acquires a
//! token, takes the tenant lock for conflict-prone resource kinds, computes
//! the minimal patch, executes it through the injected [`ApiGateway`], and
//! returns the resulting state for the orchestrator to persist.
//!
//! ## Crate organization
//!
//! - [`error`] - Error taxonomy with transient/permanent classification
//! - [`token`] - Single-flight OAuth2 token cache
//! - [`lock`] - Per-tenant mutation lock arena
//! - [`retry`] - Exponential backoff for transient read failures
//! - [`gateway`] - [`ApiGateway`] capability and [`HttpGateway`]
//! - [`state`] - Last-known resource state
//! - [`coordinator`] - The reconciliation state machine

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod retry;
pub mod state;
pub mod token;

pub use coordinator::{Phase, ReconciliationCoordinator, DEFAULT_DEADLINE};
pub use error::{ReconcileError, ReconcileResult};
pub use gateway::{ApiGateway, HttpGateway, RemoteDocument};
pub use lock::TenantLockRegistry;
pub use retry::RetryPolicy;
pub use state::ResourceState;
pub use token::{TenantToken, TokenCache};

/// Prelude module for convenient imports.
///
/// ```
/// use merx_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::coordinator::{Phase, ReconciliationCoordinator};
    pub use crate::error::{ReconcileError, ReconcileResult};
    pub use crate::gateway::{ApiGateway, HttpGateway, RemoteDocument};
    pub use crate::lock::TenantLockRegistry;
    pub use crate::retry::RetryPolicy;
    pub use crate::state::ResourceState;
    pub use crate::token::{TenantToken, TokenCache};

    pub use merx_core::{
        Credentials, DeletePolicy, ResourceKey, ResourceKindSpec, ResourcePath, SiteId,
        TenantContext, TenantId,
    };
    pub use merx_tree::{
        diff, AttrType, AttrValue, AttributeTree, FieldSchema, FieldState, ListOrdering,
        ObjectSchema, PatchDocument, RemovalEncoding, ResourceSchema, TreeError,
    };
}

// Re-export async_trait for gateway implementors.
pub use async_trait::async_trait;
