//! Manual watchdog tick CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use probe::{HttpHealthProbe, KeepalivePinger};
use provider::{HttpSandboxProvider, ProviderCredentials, SandboxSpec};
use std::sync::Arc;
use store::HttpStateStore;
use tracing::{info, warn};
use watchdog::{Config, RotationConfig, RotationController, SystemClock};

#[derive(Parser)]
#[command(name = "watchdog-cli")]
#[command(about = "Manually trigger a sandbox watchdog tick")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one tick against the configured state store and provider
    Tick {
        /// Provision a replacement even if the active sandbox is healthy
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,watchdog=debug".to_string()),
        )
        .init();

    let cli = Cli::parse();
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

    let controller = RotationController::new(
        store,
        provider,
        prober,
        keepalive,
        Arc::new(SystemClock),
        RotationConfig::default(),
        sandbox_spec,
        config.bootstrap,
    );

    match cli.command {
        Command::Tick { force } => {
            let report = controller.tick(force).await?;
            info!(?report, "tick complete");
            println!("{report:?}");
        }
    }

    Ok(())
}
