//! Merx core library
//!
//! Shared identity and configuration types for the Merx reconciliation core.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`TenantId`, `SiteId`, `ResourceKey`)
//! - [`kind`] - Resource-kind registry entries (`ResourceKindSpec`, `DeletePolicy`)
//! - [`context`] - Tenant connection context and credentials
//!
//! # Example
//!
//! ```
//! use merx_core::{ResourceKey, TenantId};
//!
//! let tenant = TenantId::new("aaaa-001");
//! let key = ResourceKey::parse_composite("shipping_method", "RefArch:usa:express", 3).unwrap();
//! assert_eq!(key.to_string(), "RefArch:usa:express");
//! assert_eq!(tenant.as_str(), "aaaa-001");
//! ```

pub mod context;
pub mod ids;
pub mod kind;

pub use context::{Credentials, TenantContext};
pub use ids::{KeyError, ResourceKey, ResourcePath, SiteId, TenantId};
pub use kind::{DeletePolicy, ResourceKindSpec};
