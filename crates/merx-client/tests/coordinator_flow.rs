//! Coordinator flow tests against an in-process mock gateway.
//!
//! Covers the empty-patch short-circuit, patch dispatch with version
//! threading, unconditional lock release on failure, conflict surfacing,
//! deadline cancellation inside the lock queue, import bootstrap, and both
//! destroy policies.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use serde_json::{json, Value};
use tokio::time::timeout;

use merx_client::async_trait;
use merx_client::prelude::*;

#[derive(Debug, Clone)]
struct Call {
    op: &'static str,
    path: String,
    body: Option<Value>,
    version: Option<i64>,
}

#[derive(Default)]
struct MockGateway {
    calls: Mutex<Vec<Call>>,
    read_body: Mutex<Value>,
    patch_error: Mutex<Option<ReconcileError>>,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        let gateway = Self::default();
        *gateway.read_body.lock().unwrap() = json!({"active": true, "version": 3});
        Arc::new(gateway)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_next_patch(&self, error: ReconcileError) {
        *self.patch_error.lock().unwrap() = Some(error);
    }

    fn record(&self, op: &'static str, path: &ResourcePath, body: Option<&Value>, version: Option<i64>) {
        self.calls.lock().unwrap().push(Call {
            op,
            path: path.to_string(),
            body: body.cloned(),
            version,
        });
    }
}

#[async_trait]
impl ApiGateway for MockGateway {
    async fn create(
        &self,
        _ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
    ) -> ReconcileResult<RemoteDocument> {
        self.record("create", path, Some(&body), None);
        Ok(RemoteDocument {
            body,
            version: Some(1),
        })
    }

    async fn read(
        &self,
        _ctx: &TenantContext,
        path: &ResourcePath,
    ) -> ReconcileResult<RemoteDocument> {
        self.record("read", path, None, None);
        let body = self.read_body.lock().unwrap().clone();
        let version = body.get("version").and_then(Value::as_i64);
        Ok(RemoteDocument { body, version })
    }

    async fn patch(
        &self,
        _ctx: &TenantContext,
        path: &ResourcePath,
        body: Value,
        version: Option<i64>,
    ) -> ReconcileResult<RemoteDocument> {
        self.record("patch", path, Some(&body), version);
        if let Some(error) = self.patch_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(RemoteDocument {
            body,
            version: version.map(|v| v + 1),
        })
    }

    async fn delete(&self, _ctx: &TenantContext, path: &ResourcePath) -> ReconcileResult<()> {
        self.record("delete", path, None, None);
        Ok(())
    }
}

fn method_schema() -> Arc<ResourceSchema> {
    Arc::new(ResourceSchema::new(
        ObjectSchema::new()
            .with_field("active", FieldSchema::of(AttrType::Boolean))
            .with_field("zone", FieldSchema::of(AttrType::Reference)),
    ))
}

fn method_kind() -> ResourceKindSpec {
    ResourceKindSpec::new(
        "shipping_method",
        "/sites/{0}/shipping-zones/{1}/methods/{2}",
        3,
    )
    .serialized()
}

fn ctx() -> TenantContext {
    TenantContext::new(
        "aaaa-001",
        "https://api.example.invalid",
        "https://auth.example.invalid/token",
        Credentials::PreIssued {
            token: "tok".to_string(),
        },
    )
}

fn coordinator(gateway: Arc<MockGateway>) -> ReconciliationCoordinator<MockGateway> {
    let tokens = Arc::new(TokenCache::new(reqwest::Client::new()));
    ReconciliationCoordinator::new(gateway, tokens)
}

fn prior_state(schema: &Arc<ResourceSchema>) -> ResourceState {
    let tree = AttributeTree::from_desired(&json!({"active": true}), schema, None).unwrap();
    let key = ResourceKey::parse_composite("shipping_method", "RefArch:usa:express", 3).unwrap();
    ResourceState::new(key, tree, Some(3))
}

#[tokio::test]
async fn test_empty_patch_skips_network_call() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();
    let state = prior_state(&schema);

    let desired =
        AttributeTree::from_desired(&json!({"active": true}), &schema, Some(&state.tree)).unwrap();
    let result = coordinator
        .update(&ctx(), &method_kind(), &state, desired)
        .await
        .unwrap();

    assert!(gateway.calls().is_empty());
    assert_eq!(result, state);
}

#[tokio::test]
async fn test_update_dispatches_patch_with_version() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();
    let state = prior_state(&schema);

    let desired =
        AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&state.tree)).unwrap();
    let result = coordinator
        .update(&ctx(), &method_kind(), &state, desired)
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "patch");
    assert_eq!(
        calls[0].path,
        "/sites/RefArch/shipping-zones/usa/methods/express"
    );
    assert_eq!(calls[0].body, Some(json!({"active": false})));
    assert_eq!(calls[0].version, Some(3));

    assert_eq!(result.version, Some(4));
    assert_eq!(
        result.tree.state("active").as_value(),
        Some(&AttrValue::Boolean(false))
    );
}

#[tokio::test]
async fn test_conflict_is_surfaced_unretried_and_lock_released() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();
    let state = prior_state(&schema);
    gateway.fail_next_patch(ReconcileError::Conflict {
        resource: state.key.to_string(),
        sent_version: Some(3),
    });

    let desired =
        AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&state.tree)).unwrap();
    let err = coordinator
        .update(&ctx(), &method_kind(), &state, desired)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Conflict { .. }));
    assert_eq!(gateway.calls().len(), 1);

    // The tenant lock must be free again even though the dispatch failed.
    let tenant = TenantId::new("aaaa-001");
    let reacquired = timeout(Duration::from_millis(100), coordinator.locks().lock(&tenant)).await;
    assert!(reacquired.is_ok());
}

#[tokio::test]
async fn test_deadline_in_lock_queue_cancels_cleanly() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone()).with_deadline(Duration::from_millis(50));
    let schema = method_schema();
    let state = prior_state(&schema);
    let tenant = TenantId::new("aaaa-001");

    let held = coordinator.locks().lock(&tenant).await;

    let desired =
        AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&state.tree)).unwrap();
    let err = coordinator
        .update(&ctx(), &method_kind(), &state, desired.clone())
        .await
        .unwrap_err();

    match err {
        ReconcileError::Cancelled { phase } => assert_eq!(phase, Phase::TokenAcquired),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(gateway.calls().is_empty());

    // The cancelled waiter left the queue intact: once the holder releases,
    // the same update goes through.
    drop(held);
    coordinator
        .update(&ctx(), &method_kind(), &state, desired)
        .await
        .unwrap();
    assert_eq!(gateway.calls().len(), 1);
}

#[tokio::test]
async fn test_create_merges_remote_document() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();
    let key = ResourceKey::parse_composite("shipping_method", "RefArch:usa:express", 3).unwrap();

    let desired =
        AttributeTree::from_desired(&json!({"active": true, "zone": "usa"}), &schema, None)
            .unwrap();
    let state = coordinator
        .create(&ctx(), &method_kind(), key.clone(), desired)
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "create");
    assert_eq!(calls[0].body, Some(json!({"active": true, "zone": "usa"})));

    assert_eq!(state.key, key);
    assert_eq!(state.version, Some(1));
    assert_eq!(
        state.tree.state("zone").as_value(),
        Some(&AttrValue::Reference("usa".to_string()))
    );
}

#[tokio::test]
async fn test_import_bootstraps_state_from_composite_key() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();

    let state = coordinator
        .import(&ctx(), &method_kind(), "RefArch:usa:express", &schema)
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "read");
    assert_eq!(
        calls[0].path,
        "/sites/RefArch/shipping-zones/usa/methods/express"
    );
    assert_eq!(state.key.segments(), &["RefArch", "usa", "express"]);
    assert_eq!(state.version, Some(3));
    assert_eq!(
        state.tree.state("active").as_value(),
        Some(&AttrValue::Boolean(true))
    );
}

#[tokio::test]
async fn test_import_rejects_malformed_composite() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();

    let err = coordinator
        .import(&ctx(), &method_kind(), "RefArch:usa", &schema)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidKey(_)));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_destroy_respects_delete_policy() {
    let gateway = MockGateway::new();
    let coordinator = coordinator(gateway.clone());
    let schema = method_schema();
    let state = prior_state(&schema);

    let detached_kind = method_kind().with_delete_policy(DeletePolicy::Detach);
    coordinator
        .destroy(&ctx(), &detached_kind, &state)
        .await
        .unwrap();
    assert!(gateway.calls().is_empty());

    coordinator
        .destroy(&ctx(), &method_kind(), &state)
        .await
        .unwrap();
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "delete");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_updates_do_not_overlap() {
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct SlowGateway {
        active: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl ApiGateway for SlowGateway {
        async fn create(
            &self,
            _ctx: &TenantContext,
            _path: &ResourcePath,
            body: Value,
        ) -> ReconcileResult<RemoteDocument> {
            Ok(RemoteDocument { body, version: None })
        }

        async fn read(
            &self,
            _ctx: &TenantContext,
            _path: &ResourcePath,
        ) -> ReconcileResult<RemoteDocument> {
            Ok(RemoteDocument {
                body: json!({}),
                version: None,
            })
        }

        async fn patch(
            &self,
            _ctx: &TenantContext,
            _path: &ResourcePath,
            body: Value,
            version: Option<i64>,
        ) -> ReconcileResult<RemoteDocument> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(RemoteDocument { body, version })
        }

        async fn delete(&self, _ctx: &TenantContext, _path: &ResourcePath) -> ReconcileResult<()> {
            Ok(())
        }
    }

    let gateway = Arc::new(SlowGateway::default());
    let tokens = Arc::new(TokenCache::new(reqwest::Client::new()));
    let coordinator = Arc::new(ReconciliationCoordinator::new(gateway.clone(), tokens));
    let schema = method_schema();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let coordinator = coordinator.clone();
        let schema = schema.clone();
        handles.push(tokio::spawn(async move {
            let state = prior_state(&schema);
            let desired =
                AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&state.tree))
                    .unwrap();
            coordinator
                .update(&ctx(), &method_kind(), &state, desired)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(gateway.peak.load(std::sync::atomic::Ordering::SeqCst), 1);
}
