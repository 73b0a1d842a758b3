//! HTTP server binary: serves the routing gateway and the watchdog trigger

use anyhow::Result;
use dotenvy::dotenv;
use probe::{HttpHealthProbe, KeepalivePinger};
use provider::{HttpSandboxProvider, ProviderCredentials, SandboxSpec};
use std::env;
use std::sync::Arc;
use std::time::Instant;
use store::HttpStateStore;
use tokio::signal;
use tracing::{info, warn};
use watchdog::config::Config;
use watchdog::gateway::{GatewayConfig, GatewayState, SelfHost};
use watchdog::health::HealthState;
use watchdog::{RotationConfig, RotationController, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info,watchdog=debug".to_string()))
        .init();

    info!("starting sandbox watchdog server");

    let config = Config::from_env()?;
    let http = reqwest::Client::new();

    let store = Arc::new(HttpStateStore::new(
        http.clone(),
        config.edge_config_base_url.clone(),
        config.edge_config_id.clone(),
        config.edge_config_token.clone(),
    ));

    let provider_credentials = config.provider_credentials.clone().unwrap_or_else(|| {
        warn!("no provider credentials configured; sandbox provisioning will fail");
        ProviderCredentials {
            api_token: String::new(),
            team_id: String::new(),
            project_id: String::new(),
        }
    });
    let provider = Arc::new(HttpSandboxProvider::new(
        http.clone(),
        config.sandbox_provider_base_url.clone(),
        provider_credentials,
    ));

    let prober = Arc::new(HttpHealthProbe::new(http.clone()));
    let keepalive = Arc::new(KeepalivePinger::new(http.clone(), config.keepalive_token.clone()));

    let sandbox_spec = SandboxSpec {
        port: config.bootstrap.port,
        runtime: "node22".to_string(),
        max_lifetime_ms: watchdog::config::ROTATION_INTERVAL.as_millis() as u64,
    };

    let controller = Arc::new(RotationController::new(
        store.clone(),
        provider,
        prober,
        keepalive,
        Arc::new(SystemClock),
        RotationConfig::default(),
        sandbox_spec,
        config.bootstrap.clone(),
    ));

    let gateway_state = Arc::new(GatewayState {
        store: store.clone(),
        http: http.clone(),
        config: GatewayConfig {
            self_host: SelfHost::from_url(config.self_url.as_deref()),
            disable_edge_rewrite: config.disable_edge_rewrite,
            debug_sandbox_routing: config.debug_sandbox_routing,
        },
    });

    let health_state = Arc::new(HealthState {
        store,
        started_at: Instant::now(),
        keepalive_token: config.keepalive_token.clone(),
        self_url_is_set: config.self_url.is_some(),
    });

    watchdog::trigger::spawn_cron(controller.clone());

    let app = watchdog::server::build(controller, gateway_state, health_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "watchdog server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("watchdog server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("received SIGINT, shutting down"),
        () = terminate => warn!("received SIGTERM, shutting down"),
    }
}
