//! Tenant token cache with single-flight acquisition.
//!
//! Tokens are cached per tenant + credential fingerprint and refreshed
//! through the OAuth2 client-credentials grant. Concurrent callers for the
//! same pair serialize on a per-key mutex held across the fetch, so exactly
//! one network token request is made per flight; waiters re-check the cache
//! after acquiring and reuse the winner's token. A failed fetch leaves the
//! slot empty, so a failure never poisons the cache for later attempts.

use dashmap::DashMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};
use crate::retry::RetryPolicy;
use merx_core::{Credentials, TenantContext, TenantId};

/// Tokens are refreshed this long before their actual expiry.
const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// A bearer token for one tenant credential pair.
///
/// Never persisted to configuration state. The [`Debug`] impl redacts the
/// token itself.
#[derive(Clone)]
pub struct TenantToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl TenantToken {
    /// The opaque bearer token.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether the token is past its (safety-adjusted) expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }
}

impl std::fmt::Debug for TenantToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// OAuth2 token response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tenant: TenantId,
    fingerprint: [u8; 32],
}

/// Process-wide token cache shared across concurrent reconciliations.
pub struct TokenCache {
    http: reqwest::Client,
    retry: RetryPolicy,
    slots: DashMap<CacheKey, Arc<Mutex<Option<TenantToken>>>>,
}

impl TokenCache {
    /// Create a cache with the default retry policy for token fetches.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_retry(http, RetryPolicy::default())
    }

    /// Create a cache with an explicit retry policy.
    #[must_use]
    pub fn with_retry(http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            slots: DashMap::new(),
        }
    }

    /// Get a valid token for the tenant, fetching one if necessary.
    ///
    /// Pre-issued tokens short-circuit without caching. For client-grant
    /// credentials, a cached token is reused until 30 seconds before its
    /// expiry.
    pub async fn get(&self, ctx: &TenantContext) -> ReconcileResult<TenantToken> {
        let (client_id, client_secret, scope) = match &ctx.credentials {
            Credentials::PreIssued { token } => {
                return Ok(TenantToken {
                    secret: token.clone(),
                    expires_at: None,
                })
            }
            Credentials::ClientGrant {
                client_id,
                client_secret,
                scope,
            } => (client_id, client_secret, scope.as_deref()),
        };

        let slot = self.slot(&ctx.tenant, client_id, client_secret);
        let mut guard = slot.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                debug!(tenant = %ctx.tenant, "token cache hit");
                return Ok(token.clone());
            }
        }

        let token = self
            .retry
            .execute("token_fetch", || {
                self.fetch(ctx, client_id, client_secret, scope)
            })
            .await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token for a tenant credential pair (e.g. after the
    /// remote rejected it with a 401).
    pub async fn invalidate(&self, ctx: &TenantContext) {
        if let Credentials::ClientGrant {
            client_id,
            client_secret,
            ..
        } = &ctx.credentials
        {
            let slot = self.slot(&ctx.tenant, client_id, client_secret);
            let mut guard = slot.lock().await;
            *guard = None;
        }
    }

    /// Number of tenant credential pairs currently tracked.
    #[must_use]
    pub fn tracked_pairs(&self) -> usize {
        self.slots.len()
    }

    fn slot(
        &self,
        tenant: &TenantId,
        client_id: &str,
        client_secret: &str,
    ) -> Arc<Mutex<Option<TenantToken>>> {
        let key = CacheKey {
            tenant: tenant.clone(),
            fingerprint: fingerprint(client_id, client_secret),
        };
        let entry = self.slots.entry(key).or_default();
        Arc::clone(entry.value())
    }

    async fn fetch(
        &self,
        ctx: &TenantContext,
        client_id: &str,
        client_secret: &str,
        scope: Option<&str>,
    ) -> ReconcileResult<TenantToken> {
        debug!(tenant = %ctx.tenant, url = %ctx.token_url, "fetching access token");

        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        let response = self
            .http
            .post(&ctx.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                ReconcileError::transient_with_source(
                    format!("token request to {} failed", ctx.token_url),
                    e,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            if status.is_server_error() {
                return Err(ReconcileError::transient(format!(
                    "token endpoint returned {status}: {body}"
                )));
            }
            return Err(ReconcileError::auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ReconcileError::auth(format!("failed to parse token response: {e}")))?;

        let expires_at = parsed.expires_in.map(|secs| {
            Instant::now()
                + Duration::from_secs(secs.saturating_sub(EXPIRY_SAFETY_MARGIN.as_secs()))
        });

        Ok(TenantToken {
            secret: parsed.access_token,
            expires_at,
        })
    }
}

fn fingerprint(client_id: &str, client_secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(client_secret.as_bytes());
    hasher.finalize().into()
}
