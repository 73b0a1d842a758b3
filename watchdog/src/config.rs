//! Configuration loading and validation
//!
//! Environment variables are read once, here, at process start and turned
//! into a typed, validated [`Config`]. Nothing downstream reads `std::env`
//! directly — this is the single injection point described in the design
//! notes ("inject a configuration value object at component construction").

use provider::{BootstrapConfig, ProviderCredentials};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const ROTATION_INTERVAL: Duration = Duration::from_secs(5 * 60 * 60);
pub const DRAIN_GRACE: Duration = Duration::from_secs(10 * 60);
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const READINESS_DEADLINE: Duration = Duration::from_secs(10 * 60);
pub const PROVISION_MAX_RETRIES: usize = 4;
pub const PROVISION_INITIAL_BACKOFF: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("environment variable {name} is not a valid {kind}: {value}")]
    Invalid {
        name: &'static str,
        kind: &'static str,
        value: String,
    },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn bool_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parses the `NEXT_APP_SKIP_MONITORING_ROUTES` feature-flag semantics:
/// unset and the literals `""`, `"false"`, `"0"`, `"off"` (case-insensitive,
/// trimmed) are disabled; anything else is enabled.
#[must_use]
pub fn monitoring_routes_disabled() -> bool {
    match env::var("NEXT_APP_SKIP_MONITORING_ROUTES") {
        Err(_) => false,
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            !matches!(v.as_str(), "" | "false" | "0" | "off")
        }
    }
}

/// Fully resolved, validated process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,

    pub edge_config_base_url: String,
    pub edge_config_id: String,
    pub edge_config_token: String,

    pub sandbox_provider_base_url: String,
    pub provider_credentials: Option<ProviderCredentials>,

    pub bootstrap: BootstrapConfig,

    pub keepalive_token: String,
    pub self_url: Option<String>,
    pub disable_edge_rewrite: bool,
    pub debug_sandbox_routing: bool,
}

impl Config {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first missing
    /// required variable, or [`ConfigError::Invalid`] if a variable that
    /// must parse to a specific type does not.
    pub fn from_env() -> Result<Self, ConfigError> {
        let edge_config_id = required("EDGE_CONFIG_ID")?;
        let edge_config_token = required("EDGE_CONFIG_TOKEN")?;
        let repo = required("SANDBOX_APP_REPO")?;
        let keepalive_token = required("KEEPALIVE_TOKEN")?;

        let git_ref = optional("SANDBOX_APP_REF", "main");
        let workdir = optional("SANDBOX_WORKDIR", "/tmp/next-sandbox-app");

        let port_raw = optional("SANDBOX_PORT", "3000");
        let port: u16 = port_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "SANDBOX_PORT",
            kind: "positive integer",
            value: port_raw.clone(),
        })?;
        if port == 0 {
            return Err(ConfigError::Invalid {
                name: "SANDBOX_PORT",
                kind: "positive integer",
                value: port_raw,
            });
        }

        let self_url = env::var("SANDBOX_SELF_URL").ok();

        let provider_credentials = {
            let token = env::var("VERCEL_TOKEN")
                .or_else(|_| env::var("VERCEL_API_TOKEN"))
                .ok();
            let team_id = env::var("VERCEL_TEAM_ID")
                .or_else(|_| env::var("VERCEL_ORG_ID"))
                .ok();
            let project_id = env::var("VERCEL_PROJECT_ID").ok();

            match (token, team_id, project_id) {
                (Some(api_token), Some(team_id), Some(project_id)) => Some(ProviderCredentials {
                    api_token,
                    team_id,
                    project_id,
                }),
                _ => None,
            }
        };

        Ok(Self {
            bind_addr: format!("0.0.0.0:{}", optional("PORT", "3000")),
            edge_config_base_url: optional("EDGE_CONFIG_BASE_URL", "https://edge-config.vercel.com"),
            edge_config_id,
            edge_config_token,
            sandbox_provider_base_url: optional(
                "SANDBOX_PROVIDER_BASE_URL",
                "https://api.vercel.com",
            ),
            provider_credentials,
            bootstrap: BootstrapConfig {
                workdir,
                repo,
                git_ref,
                port,
                keepalive_token: keepalive_token.clone(),
                self_url: self_url.clone().unwrap_or_default(),
            },
            keepalive_token,
            self_url,
            disable_edge_rewrite: bool_flag("DISABLE_EDGE_REWRITE"),
            debug_sandbox_routing: bool_flag("DEBUG_SANDBOX_ROUTING"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn monitoring_disabled_treats_unset_and_falsy_literals_as_disabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("NEXT_APP_SKIP_MONITORING_ROUTES");
        assert!(!monitoring_routes_disabled());

        for falsy in ["", "false", "FALSE", "0", "off", " Off "] {
            env::set_var("NEXT_APP_SKIP_MONITORING_ROUTES", falsy);
            assert!(!monitoring_routes_disabled(), "{falsy:?} should be disabled");
        }
        env::remove_var("NEXT_APP_SKIP_MONITORING_ROUTES");
    }

    #[test]
    fn monitoring_disabled_treats_anything_else_as_enabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        for truthy in ["true", "1", "on", "yes"] {
            env::set_var("NEXT_APP_SKIP_MONITORING_ROUTES", truthy);
            assert!(monitoring_routes_disabled(), "{truthy:?} should be enabled");
        }
        env::remove_var("NEXT_APP_SKIP_MONITORING_ROUTES");
    }
}
