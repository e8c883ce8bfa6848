//! Tenant connection context and credentials.

use serde::{Deserialize, Serialize};

use crate::ids::TenantId;

/// Credentials for a tenant's API access.
///
/// The [`Debug`] impl redacts tokens and secrets to prevent accidental
/// credential exposure in log output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// A pre-issued bearer token supplied by the orchestrator.
    PreIssued { token: String },

    /// OAuth2 client-credentials grant.
    ClientGrant {
        client_id: String,
        client_secret: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreIssued { .. } => f
                .debug_struct("PreIssued")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::ClientGrant {
                client_id, scope, ..
            } => f
                .debug_struct("ClientGrant")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("scope", scope)
                .finish(),
        }
    }
}

/// Connection context for a tenant, supplied by the external orchestrator.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// The tenant realm.
    pub tenant: TenantId,
    /// Base URL of the tenant's API.
    pub base_url: String,
    /// URL of the OAuth2 token endpoint.
    pub token_url: String,
    /// Credentials for this tenant.
    pub credentials: Credentials,
}

impl TenantContext {
    /// Create a context for a tenant.
    pub fn new(
        tenant: impl Into<TenantId>,
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            base_url: base_url.into(),
            token_url: token_url.into(),
            credentials,
        }
    }
}
