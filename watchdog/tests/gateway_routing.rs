//! End-to-end router test: builds the real `axum::Router` via
//! `watchdog::server::build` and drives it through `tower::ServiceExt::oneshot`,
//! the way a request actually arrives — instead of calling handler functions
//! directly, this exercises the route priority (`trigger`/`health` before the
//! gateway fallback) and axum's own extractor wiring.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use probe::{HealthProbe, KeepalivePing, ProbeOutcome};
use provider::{
    BootstrapConfig, CommandOutcome, CommandSpec, ProviderError, SandboxHandle, SandboxProvider,
    SandboxSpec,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use store::{StateStore, StoreError, WriteOp};
use tower::ServiceExt;
use watchdog::clock::Clock;
use watchdog::controller::{RotationConfig, RotationController};
use watchdog::gateway::{GatewayConfig, GatewayState, SelfHost};
use watchdog::health::HealthState;

#[derive(Default)]
struct MemStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

#[async_trait]
impl StateStore for MemStore {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap();
        for op in ops {
            match op {
                WriteOp::Upsert { key, value } => {
                    values.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }
}

struct DummyProvider;

#[async_trait]
impl SandboxProvider for DummyProvider {
    async fn create(&self, _spec: &SandboxSpec) -> Result<SandboxHandle, ProviderError> {
        Err(ProviderError::Api {
            status: 500,
            body: "not exercised in this test".into(),
        })
    }

    async fn get(&self, id: &str) -> Result<SandboxHandle, ProviderError> {
        Err(ProviderError::NotFound { id: id.to_string() })
    }

    async fn stop(&self, _handle: &SandboxHandle) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn run_command(
        &self,
        _handle: &SandboxHandle,
        _command: &CommandSpec,
    ) -> Result<CommandOutcome, ProviderError> {
        Ok(CommandOutcome::Exited(0))
    }
}

struct DummyProbe;

#[async_trait]
impl HealthProbe for DummyProbe {
    async fn probe(&self, _base_url: &str, _role: &str) -> ProbeOutcome {
        ProbeOutcome::unhealthy("not exercised in this test")
    }
}

struct DummyKeepalive;

#[async_trait]
impl KeepalivePing for DummyKeepalive {
    async fn ping(&self, _base_url: &str) {}
}

struct FrozenClock(DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn build_router(store: Arc<MemStore>) -> axum::Router {
    let controller = Arc::new(RotationController::new(
        store.clone(),
        Arc::new(DummyProvider),
        Arc::new(DummyProbe),
        Arc::new(DummyKeepalive),
        Arc::new(FrozenClock(Utc::now())),
        RotationConfig {
            readiness_poll_interval: std::time::Duration::from_millis(1),
            readiness_deadline: std::time::Duration::from_millis(20),
            provision_max_retries: 1,
            provision_initial_backoff: std::time::Duration::from_millis(1),
            ..RotationConfig::default()
        },
        SandboxSpec {
            port: 3000,
            runtime: "node22".to_string(),
            max_lifetime_ms: 18_000_000,
        },
        BootstrapConfig {
            workdir: "/workdir".to_string(),
            repo: "example/repo".to_string(),
            git_ref: "main".to_string(),
            port: 3000,
            keepalive_token: "test-token".to_string(),
            self_url: "https://router.example".to_string(),
        },
    ));

    let gateway_state = Arc::new(GatewayState {
        store: store.clone(),
        http: reqwest::Client::new(),
        config: GatewayConfig {
            self_host: SelfHost::Host("router.example".to_string()),
            disable_edge_rewrite: false,
            debug_sandbox_routing: false,
        },
    });

    let health_state = Arc::new(HealthState {
        store,
        started_at: std::time::Instant::now(),
        keepalive_token: "test-token".to_string(),
        self_url_is_set: true,
    });

    watchdog::server::build(controller, gateway_state, health_state)
}

#[tokio::test]
async fn health_route_takes_priority_over_the_gateway_fallback() {
    let router = build_router(Arc::new(MemStore::default()));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn keepalive_route_rejects_a_missing_token() {
    let router = build_router(Arc::new(MemStore::default()));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/internal/keepalive")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gateway_fallback_returns_503_with_no_active_sandbox() {
    let router = build_router(Arc::new(MemStore::default()));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/dashboard")
                .header("host", "preview.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );
}

#[tokio::test]
async fn forced_watchdog_tick_surfaces_a_provisioning_failure_as_500() {
    let router = build_router(Arc::new(MemStore::default()));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/watchdog?force=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn self_host_requests_bypass_the_gateway_with_a_404() {
    let router = build_router(Arc::new(MemStore::default()));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/dashboard")
                .header("host", "router.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
