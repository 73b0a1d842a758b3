//! C7: the HTTP and cron entry points that dispatch into a [`RotationController`] tick

use crate::config::monitoring_routes_disabled;
use crate::controller::RotationController;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use probe::{HealthProbe, KeepalivePing};
use provider::SandboxProvider;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use store::StateStore;
use tokio::time::interval;
use tracing::{error, info};

#[derive(Debug, Deserialize, Default)]
pub struct TickQuery {
    force: Option<String>,
}

/// `GET|POST /watchdog` — manual trigger, gated by the monitoring-routes flag
pub async fn handle_watchdog<S, P, H, K>(
    State(controller): State<Arc<RotationController<S, P, H, K>>>,
    Query(query): Query<TickQuery>,
) -> Response
where
    S: StateStore,
    P: SandboxProvider,
    H: HealthProbe,
    K: KeepalivePing,
{
    if monitoring_routes_disabled() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let force_provision = query.force.is_some();
    match controller.tick(force_provision).await {
        Ok(report) => {
            info!(?report, "watchdog tick complete");
            (StatusCode::OK, "ok").into_response()
        }
        Err(err) => {
            error!(error = %err, "watchdog tick failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "watchdog failure").into_response()
        }
    }
}

/// Spawn the cron-style background loop invoking `Tick(false)` on the fixed
/// 5-minute schedule named in the specification. The controller's own tick
/// lock serializes this against any concurrent manual trigger.
pub fn spawn_cron<S, P, H, K>(controller: Arc<RotationController<S, P, H, K>>)
where
    S: StateStore + 'static,
    P: SandboxProvider + 'static,
    H: HealthProbe + 'static,
    K: KeepalivePing + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(5 * 60));
        loop {
            ticker.tick().await;
            if monitoring_routes_disabled() {
                continue;
            }
            match controller.tick(false).await {
                Ok(report) => info!(?report, "cron tick complete"),
                Err(err) => error!(error = %err, "cron tick failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_query_flag_is_detected_by_presence_not_value() {
        let query = TickQuery {
            force: Some(String::new()),
        };
        assert!(query.force.is_some());
        let query = TickQuery { force: None };
        assert!(query.force.is_none());
    }
}
