//! The fixed bootstrap sequence run inside a freshly created sandbox

use crate::client::SandboxProvider;
use crate::error::ProviderError;
use crate::models::{CommandOutcome, CommandSpec, SandboxHandle, SandboxSpec};
use std::collections::HashMap;
use tracing::{error, warn};

/// Parameters needed to bootstrap a sandbox into a running application
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub workdir: String,
    pub repo: String,
    pub git_ref: String,
    pub port: u16,
    pub keepalive_token: String,
    pub self_url: String,
}

/// Create a sandbox and run the bootstrap sequence against it.
///
/// On any non-detached step failure, the partial sandbox is stopped
/// best-effort (errors logged, never propagated) and the original error is
/// returned so the caller's outer retry loop can try again from scratch.
///
/// # Errors
///
/// Returns the underlying [`ProviderError`] from `create` or from whichever
/// bootstrap step failed first.
pub async fn create_and_bootstrap(
    provider: &dyn SandboxProvider,
    spec: &SandboxSpec,
    bootstrap: &BootstrapConfig,
) -> Result<SandboxHandle, ProviderError> {
    let handle = provider.create(spec).await?;

    match run_bootstrap_sequence(provider, &handle, bootstrap).await {
        Ok(()) => Ok(handle),
        Err(err) => {
            if let Err(stop_err) = provider.stop(&handle).await {
                warn!(
                    sandbox_id = %handle.id,
                    error = %stop_err,
                    "best-effort stop of partially bootstrapped sandbox failed"
                );
            }
            Err(err)
        }
    }
}

async fn run_bootstrap_sequence(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    cfg: &BootstrapConfig,
) -> Result<(), ProviderError> {
    run_step(
        provider,
        handle,
        CommandSpec::new("clean-workdir", "rm", vec!["-rf".into(), cfg.workdir.clone()]),
    )
    .await?;

    run_step(
        provider,
        handle,
        CommandSpec::new("make-workdir", "mkdir", vec!["-p".into(), cfg.workdir.clone()]),
    )
    .await?;

    run_step(
        provider,
        handle,
        CommandSpec::new(
            "clone",
            "git",
            vec![
                "clone".into(),
                "--branch".into(),
                cfg.git_ref.clone(),
                "--single-branch".into(),
                "--depth".into(),
                "1".into(),
                cfg.repo.clone(),
                cfg.workdir.clone(),
            ],
        ),
    )
    .await?;

    run_step(
        provider,
        handle,
        CommandSpec::new("enable-corepack", "corepack", vec!["enable".into()]).sudo(),
    )
    .await?;

    run_step(
        provider,
        handle,
        CommandSpec::new(
            "install",
            "pnpm",
            vec!["install".into(), "--no-frozen-lockfile".into()],
        )
        .with_cwd(cfg.workdir.clone()),
    )
    .await?;

    let mut build_env = HashMap::new();
    build_env.insert(
        "NEXT_APP_SKIP_MONITORING_ROUTES".to_string(),
        "true".to_string(),
    );
    run_step(
        provider,
        handle,
        CommandSpec::new(
            "build",
            "pnpm",
            vec!["--filter".into(), "next-app".into(), "build".into()],
        )
        .with_cwd(cfg.workdir.clone())
        .with_env(build_env),
    )
    .await?;

    let mut start_env = HashMap::new();
    start_env.insert("PORT".to_string(), cfg.port.to_string());
    start_env.insert("KEEPALIVE_TOKEN".to_string(), cfg.keepalive_token.clone());
    start_env.insert("SANDBOX_APP_REPO".to_string(), cfg.repo.clone());
    start_env.insert("SANDBOX_APP_REF".to_string(), cfg.git_ref.clone());
    start_env.insert("SANDBOX_SELF_URL".to_string(), cfg.self_url.clone());
    start_env.insert(
        "NEXT_APP_SKIP_MONITORING_ROUTES".to_string(),
        "true".to_string(),
    );
    start_env.insert("NODE_ENV".to_string(), "production".to_string());

    run_step(
        provider,
        handle,
        CommandSpec::new(
            "start",
            "pnpm",
            vec!["--filter".into(), "next-app".into(), "start".into()],
        )
        .with_cwd(cfg.workdir.clone())
        .with_env(start_env)
        .detached(),
    )
    .await?;

    Ok(())
}

async fn run_step(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    command: CommandSpec,
) -> Result<CommandOutcome, ProviderError> {
    match provider.run_command(handle, &command).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            error!(step = command.step, error = %err, "bootstrap step failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingProvider {
        steps_run: Mutex<Vec<String>>,
        fail_at: Option<&'static str>,
        stopped: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SandboxProvider for RecordingProvider {
        async fn create(&self, _spec: &SandboxSpec) -> Result<SandboxHandle, ProviderError> {
            Ok(SandboxHandle {
                id: "sbx-test".to_string(),
                url: "https://sbx-test.example".to_string(),
            })
        }

        async fn get(&self, id: &str) -> Result<SandboxHandle, ProviderError> {
            Ok(SandboxHandle {
                id: id.to_string(),
                url: "https://sbx-test.example".to_string(),
            })
        }

        async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProviderError> {
            self.stopped.lock().unwrap().push(handle.id.clone());
            Ok(())
        }

        async fn run_command(
            &self,
            _handle: &SandboxHandle,
            command: &CommandSpec,
        ) -> Result<CommandOutcome, ProviderError> {
            self.steps_run.lock().unwrap().push(command.step.to_string());
            if self.fail_at == Some(command.step) {
                return Err(ProviderError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(if command.detached {
                CommandOutcome::Running
            } else {
                CommandOutcome::Exited(0)
            })
        }
    }

    fn test_spec() -> SandboxSpec {
        SandboxSpec {
            port: 3000,
            runtime: "node22".to_string(),
            max_lifetime_ms: 18_000_000,
        }
    }

    fn test_bootstrap_config() -> BootstrapConfig {
        BootstrapConfig {
            workdir: "/tmp/next-sandbox-app".to_string(),
            repo: "https://github.com/example/app".to_string(),
            git_ref: "main".to_string(),
            port: 3000,
            keepalive_token: "secret".to_string(),
            self_url: "https://router.example".to_string(),
        }
    }

    #[tokio::test]
    async fn runs_all_seven_steps_in_order() {
        let provider = RecordingProvider {
            steps_run: Mutex::new(Vec::new()),
            fail_at: None,
            stopped: Mutex::new(Vec::new()),
        };

        let handle = create_and_bootstrap(&provider, &test_spec(), &test_bootstrap_config())
            .await
            .unwrap();

        assert_eq!(handle.id, "sbx-test");
        let steps = provider.steps_run.lock().unwrap().clone();
        assert_eq!(
            steps,
            vec![
                "clean-workdir",
                "make-workdir",
                "clone",
                "enable-corepack",
                "install",
                "build",
                "start",
            ]
        );
        assert!(provider.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_partial_sandbox_on_bootstrap_failure() {
        let provider = RecordingProvider {
            steps_run: Mutex::new(Vec::new()),
            fail_at: Some("install"),
            stopped: Mutex::new(Vec::new()),
        };

        let result = create_and_bootstrap(&provider, &test_spec(), &test_bootstrap_config()).await;

        assert!(result.is_err());
        assert_eq!(provider.stopped.lock().unwrap().clone(), vec!["sbx-test"]);
        // the failed step was attempted, but nothing after it ran
        let steps = provider.steps_run.lock().unwrap().clone();
        assert_eq!(
            steps,
            vec!["clean-workdir", "make-workdir", "clone", "enable-corepack", "install"]
        );
    }
}
