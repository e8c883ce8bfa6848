//! API gateway boundary.
//!
//! The coordinator talks to the remote system through the [`ApiGateway`]
//! capability; [`HttpGateway`] is the production implementation. Conflict
//! responses are mapped to a distinct error kind from generic failures, and
//! reads ride the retry policy while mutations are never blind-retried.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::retry::RetryPolicy;
use crate::token::TokenCache;
use merx_core::{ResourcePath, TenantContext};

/// A remote resource document plus its optimistic-concurrency version, when
/// the resource kind carries one.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    /// Full resource body as returned by the remote.
    pub body: Value,
    /// Version to send on the next update.
    pub version: Option<i64>,
}

/// Capability for reaching the remote commerce API.
///
/// Injected into the coordinator; paths are tenant/site/resource-id
/// templated and relative to the tenant's base URL.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// Create a resource and return its document.
    async fn create(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
    ) -> ReconcileResult<RemoteDocument>;

    /// Read a resource.
    async fn read(&self, ctx: &TenantContext, path: &ResourcePath)
        -> ReconcileResult<RemoteDocument>;

    /// Apply a partial update, sending the last-observed version for
    /// resources with optimistic concurrency.
    async fn patch(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
        version: Option<i64>,
    ) -> ReconcileResult<RemoteDocument>;

    /// Delete a resource.
    async fn delete(&self, ctx: &TenantContext, path: &ResourcePath) -> ReconcileResult<()>;
}

/// HTTP implementation of the gateway.
///
/// Resources are fully path-addressed, so creation is an idempotent `PUT` at
/// the resource path; updates go out as `PATCH` with the last-observed
/// version in an `If-Match` header.
pub struct HttpGateway {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    retry: RetryPolicy,
}

impl HttpGateway {
    /// Create a gateway with its own HTTP client.
    pub fn new(tokens: Arc<TokenCache>) -> ReconcileResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("merx/0.1")
            .build()
            .map_err(|e| ReconcileError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_http_client(tokens, http))
    }

    /// Create a gateway with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(tokens: Arc<TokenCache>, http: reqwest::Client) -> Self {
        Self {
            http,
            tokens,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the retry policy for reads.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(
        &self,
        ctx: &TenantContext,
        method: Method,
        url: &str,
        body: Option<&Value>,
        version: Option<i64>,
    ) -> ReconcileResult<reqwest::Response> {
        let token = self.tokens.get(ctx).await?;
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(token.secret());
        if let Some(version) = version {
            builder = builder.header("If-Match", version.to_string());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .send()
            .await
            .map_err(|e| ReconcileError::transient_with_source(format!("request to {url} failed"), e))
    }

    /// Send a request, refreshing the cached token once on a 401.
    async fn request(
        &self,
        ctx: &TenantContext,
        method: Method,
        path: &ResourcePath,
        body: Option<&Value>,
        version: Option<i64>,
    ) -> ReconcileResult<reqwest::Response> {
        let url = format!("{}{}", ctx.base_url.trim_end_matches('/'), path.as_str());
        let response = self
            .send_once(ctx, method.clone(), &url, body, version)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        debug!(tenant = %ctx.tenant, path = %path, "token rejected, refreshing once");
        self.tokens.invalidate(ctx).await;
        self.send_once(ctx, method, &url, body, version).await
    }

    async fn into_document(
        &self,
        response: reqwest::Response,
        path: &ResourcePath,
        sent_version: Option<i64>,
    ) -> ReconcileResult<RemoteDocument> {
        let status = response.status();
        if !status.is_success() {
            return Err(map_failure(status, response, path, sent_version).await);
        }
        let body: Value = response.json().await.map_err(|e| ReconcileError::Gateway {
            status: status.as_u16(),
            message: format!("malformed response body: {e}"),
        })?;
        let version = body.get("version").and_then(Value::as_i64);
        Ok(RemoteDocument { body, version })
    }

    async fn read_once(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
    ) -> ReconcileResult<RemoteDocument> {
        let response = self
            .request(ctx, Method::GET, path, None, None)
            .await?;
        self.into_document(response, path, None).await
    }
}

#[async_trait]
impl ApiGateway for HttpGateway {
    async fn create(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
    ) -> ReconcileResult<RemoteDocument> {
        let response = self
            .request(ctx, Method::PUT, path, Some(&body), None)
            .await?;
        self.into_document(response, path, None).await
    }

    async fn read(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
    ) -> ReconcileResult<RemoteDocument> {
        self.retry
            .execute("read", || self.read_once(ctx, path))
            .await
    }

    async fn patch(
        &self,
        ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
        version: Option<i64>,
    ) -> ReconcileResult<RemoteDocument> {
        let response = self
            .request(ctx, Method::PATCH, path, Some(&body), version)
            .await?;
        self.into_document(response, path, version).await
    }

    async fn delete(&self, ctx: &TenantContext, path: &ResourcePath) -> ReconcileResult<()> {
        let response = self
            .request(ctx, Method::DELETE, path, None, None)
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(map_failure(status, response, path, None).await)
    }
}

async fn map_failure(
    status: StatusCode,
    response: reqwest::Response,
    path: &ResourcePath,
    sent_version: Option<i64>,
) -> ReconcileError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ReconcileError::auth(format!("remote returned {status}: {message}"))
        }
        StatusCode::NOT_FOUND => ReconcileError::NotFound {
            resource: path.to_string(),
        },
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            warn!(path = %path, sent_version, "remote rejected mutation with a conflict");
            ReconcileError::Conflict {
                resource: path.to_string(),
                sent_version,
            }
        }
        s if s.is_server_error() => {
            ReconcileError::transient(format!("remote returned {status}: {message}"))
        }
        _ => ReconcileError::Gateway {
            status: status.as_u16(),
            message,
        },
    }
}
