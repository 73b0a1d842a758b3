//! Types describing provisioned sandboxes and the commands run inside them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Credentials the provider needs to call the sandbox platform API
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub api_token: String,
    pub team_id: String,
    pub project_id: String,
}

/// Request to create a new sandbox instance
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub port: u16,
    pub runtime: String,
    /// Hint for the provider's own lifetime accounting; equal to `ROTATION_INTERVAL_MS`
    pub max_lifetime_ms: u64,
}

/// Result of [`crate::client::SandboxProvider::create`] / [`crate::client::SandboxProvider::get`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub id: String,
    pub url: String,
}

/// One shell command to run inside a sandbox during bootstrap
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub step: &'static str,
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub sudo: bool,
    pub detached: bool,
}

impl CommandSpec {
    #[must_use]
    pub fn new(step: &'static str, cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            step,
            cmd: cmd.into(),
            args,
            cwd: None,
            env: HashMap::new(),
            sudo: false,
            detached: false,
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    #[must_use]
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }
}

/// Outcome of a [`crate::client::SandboxProvider::run_command`] call
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Exited(i32),
    Running,
}
