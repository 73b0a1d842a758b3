//! Router assembly: trigger + health routes take priority, the gateway
//! rewrite handles everything else.

use crate::controller::RotationController;
use crate::gateway::{self, GatewayState};
use crate::health::{self, HealthState};
use crate::trigger;
use axum::routing::{any, get};
use axum::Router;
use probe::{HealthProbe, KeepalivePing};
use provider::SandboxProvider;
use std::sync::Arc;
use store::StateStore;
use tower_http::trace::TraceLayer;

pub fn build<S, P, H, K>(
    controller: Arc<RotationController<S, P, H, K>>,
    gateway_state: Arc<GatewayState<S>>,
    health_state: Arc<HealthState<S>>,
) -> Router
where
    S: StateStore + 'static,
    P: SandboxProvider + 'static,
    H: HealthProbe + 'static,
    K: KeepalivePing + 'static,
{
    let trigger_router = Router::new()
        .route(
            "/watchdog",
            get(trigger::handle_watchdog::<S, P, H, K>).post(trigger::handle_watchdog::<S, P, H, K>),
        )
        .with_state(controller);

    let health_router = Router::new()
        .route("/api/health", get(health::api_health::<S>))
        .route("/internal/keepalive", get(health::internal_keepalive::<S>))
        .with_state(health_state);

    let gateway_router = Router::new()
        .route("/", any(gateway::handle::<S>))
        .route("/{*path}", any(gateway::handle::<S>))
        .with_state(gateway_state);

    trigger_router
        .merge(health_router)
        .fallback_service(gateway_router)
        .layer(TraceLayer::new_for_http())
}
