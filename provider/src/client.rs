//! Sandbox provider client: create/get/stop instances, run remote commands

use crate::error::{BootstrapError, ProviderError};
use crate::models::{CommandOutcome, CommandSpec, ProviderCredentials, SandboxHandle, SandboxSpec};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Create, inspect, stop, and run commands in sandbox instances
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, ProviderError>;

    async fn get(&self, id: &str) -> Result<SandboxHandle, ProviderError>;

    /// Stop a sandbox. Idempotent: a provider 404 surfaces as
    /// [`ProviderError::NotFound`] rather than a generic API error so the
    /// caller can treat "already gone" as success.
    async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProviderError>;

    async fn run_command(
        &self,
        handle: &SandboxHandle,
        command: &CommandSpec,
    ) -> Result<CommandOutcome, ProviderError>;
}

/// [`SandboxProvider`] backed by the sandbox platform's REST API
pub struct HttpSandboxProvider {
    client: reqwest::Client,
    base_url: String,
    credentials: ProviderCredentials,
}

impl HttpSandboxProvider {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String, credentials: ProviderCredentials) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    fn sandboxes_url(&self) -> String {
        format!(
            "{}/v1/teams/{}/projects/{}/sandboxes",
            self.base_url.trim_end_matches('/'),
            self.credentials.team_id,
            self.credentials.project_id
        )
    }

    fn sandbox_url(&self, id: &str) -> String {
        format!("{}/{}", self.sandboxes_url(), id)
    }

    fn exec_url(&self, id: &str) -> String {
        format!("{}/exec", self.sandbox_url(id))
    }

    async fn classify_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return ProviderError::NotFound {
                id: String::new(),
            };
        }
        let body = response.text().await.unwrap_or_default();
        ProviderError::Api {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        }
    }
}

#[derive(Deserialize)]
struct SandboxResponse {
    id: String,
    url: String,
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, ProviderError> {
        let response = self
            .client
            .post(self.sandboxes_url())
            .bearer_auth(&self.credentials.api_token)
            .json(&json!({
                "port": spec.port,
                "runtime": spec.runtime,
                "maxLifetimeMs": spec.max_lifetime_ms,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let parsed: SandboxResponse = response.json().await?;
        Ok(SandboxHandle {
            id: parsed.id,
            url: parsed.url,
        })
    }

    async fn get(&self, id: &str) -> Result<SandboxHandle, ProviderError> {
        let response = self
            .client
            .get(self.sandbox_url(id))
            .bearer_auth(&self.credentials.api_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound { id: id.to_string() });
        }
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let parsed: SandboxResponse = response.json().await?;
        Ok(SandboxHandle {
            id: parsed.id,
            url: parsed.url,
        })
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.sandbox_url(&handle.id))
            .bearer_auth(&self.credentials.api_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                id: handle.id.clone(),
            });
        }
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        Ok(())
    }

    async fn run_command(
        &self,
        handle: &SandboxHandle,
        command: &CommandSpec,
    ) -> Result<CommandOutcome, ProviderError> {
        let response = self
            .client
            .post(self.exec_url(&handle.id))
            .bearer_auth(&self.credentials.api_token)
            .json(&json!({
                "cmd": command.cmd,
                "args": command.args,
                "cwd": command.cwd,
                "env": command.env,
                "sudo": command.sudo,
                "detached": command.detached,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        if command.detached {
            // The platform accepts the request and keeps the process running
            // past this call; nothing further to await.
            return Ok(CommandOutcome::Running);
        }

        stream_exec_output(command.step, response).await
    }
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ExecLine {
    Stdout { line: String },
    Stderr { line: String },
    Exit { code: i32 },
}

/// Consume the provider's newline-delimited-JSON exec stream, logging each
/// output line tagged with `step`, and resolve the final exit code.
async fn stream_exec_output(
    step: &'static str,
    response: reqwest::Response,
) -> Result<CommandOutcome, ProviderError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut exit_code: Option<i32> = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].to_string();
            buffer.drain(..=pos);
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecLine>(&line) {
                Ok(ExecLine::Stdout { line }) => debug!(step, "{line}"),
                Ok(ExecLine::Stderr { line }) => warn!(step, "{line}"),
                Ok(ExecLine::Exit { code }) => exit_code = Some(code),
                Err(_) => debug!(step, "{line}"),
            }
        }
    }

    match exit_code {
        Some(code) if code == 0 => Ok(CommandOutcome::Exited(code)),
        Some(code) => Err(ProviderError::Bootstrap(BootstrapError::NonZeroExit {
            step,
            exit_code: code,
            tail: buffer.chars().take(500).collect(),
        })),
        None => Err(ProviderError::Bootstrap(BootstrapError::NoExitStatus { step })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_url_nests_under_team_and_project() {
        let provider = HttpSandboxProvider::new(
            reqwest::Client::new(),
            "https://sandboxes.example".to_string(),
            ProviderCredentials {
                api_token: "tok".to_string(),
                team_id: "team1".to_string(),
                project_id: "proj1".to_string(),
            },
        );
        assert_eq!(
            provider.sandbox_url("sbx-1"),
            "https://sandboxes.example/v1/teams/team1/projects/proj1/sandboxes/sbx-1"
        );
        assert_eq!(
            provider.exec_url("sbx-1"),
            "https://sandboxes.example/v1/teams/team1/projects/proj1/sandboxes/sbx-1/exec"
        );
    }
}
