//! The rotation controller: one watchdog tick, end to end
//!
//! `Tick(forceProvision)` walks `Idle -> Assess -> {Keep | Provision ->
//! WaitReady -> Promote} -> Drain -> Persist -> Done | Fail` over the
//! persisted [`SandboxState`], exactly as specified. The controller is
//! generic over its collaborators so tests substitute in-memory fakes for
//! the state store, provider, and prober.

use crate::clock::Clock;
use crate::error::TickError;
use probe::{HealthProbe, KeepalivePing, ProbeOutcome};
use provider::{
    create_and_bootstrap, BootstrapConfig, ProviderError, SandboxHandle, SandboxProvider,
    SandboxSpec,
};
use std::sync::Arc;
use std::time::Duration;
use store::{
    keys, DrainingSandboxRecord, LastFailure, RetryConfig, RetryExecutor, SandboxRecord,
    SandboxState, SandboxStatus, StateStore, WriteOp,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn, Instrument};

/// Tunable timings, defaulting to the values named in the specification but
/// overridable so tests don't block on real 10-minute deadlines.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub rotation_interval: Duration,
    pub drain_grace: Duration,
    pub readiness_poll_interval: Duration,
    pub readiness_deadline: Duration,
    pub provision_max_retries: usize,
    pub provision_initial_backoff: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_interval: crate::config::ROTATION_INTERVAL,
            drain_grace: crate::config::DRAIN_GRACE,
            readiness_poll_interval: crate::config::READINESS_POLL_INTERVAL,
            readiness_deadline: crate::config::READINESS_DEADLINE,
            provision_max_retries: crate::config::PROVISION_MAX_RETRIES,
            provision_initial_backoff: crate::config::PROVISION_INITIAL_BACKOFF,
        }
    }
}

/// Summary of what a tick did, returned to the HTTP trigger for logging
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub provisioned: bool,
    pub reason: Option<String>,
    pub active_url: Option<String>,
}

pub struct RotationController<S, P, H, K> {
    store: Arc<S>,
    provider: Arc<P>,
    prober: Arc<H>,
    keepalive: Arc<K>,
    clock: Arc<dyn Clock>,
    config: RotationConfig,
    sandbox_spec: SandboxSpec,
    bootstrap: BootstrapConfig,
    tick_lock: Mutex<()>,
}

impl<S, P, H, K> RotationController<S, P, H, K>
where
    S: StateStore,
    P: SandboxProvider,
    H: HealthProbe,
    K: KeepalivePing,
{
    #[must_use]
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        prober: Arc<H>,
        keepalive: Arc<K>,
        clock: Arc<dyn Clock>,
        config: RotationConfig,
        sandbox_spec: SandboxSpec,
        bootstrap: BootstrapConfig,
    ) -> Self {
        Self {
            store,
            provider,
            prober,
            keepalive,
            clock,
            config,
            sandbox_spec,
            bootstrap,
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one watchdog tick. Not re-entrant within this process: a second
    /// concurrent call waits for the first to finish (cross-process races
    /// are tolerated, not prevented, per the concurrency model).
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] for any failure before the persist-success
    /// branch; `lastFailure` is recorded best-effort before returning.
    pub async fn tick(&self, force_provision: bool) -> Result<TickReport, TickError> {
        let _guard = self.tick_lock.lock().await;

        let loaded = self.load().await?;
        let mut state = loaded.deep_clone();

        match self.run_tick(&mut state, force_provision).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.record_failure(&loaded, &err).await;
                Err(err)
            }
        }
    }

    async fn load(&self) -> Result<SandboxState, TickError> {
        let value = self.store.read_first(&keys::state_fallbacks()).await?;
        Ok(match value {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => SandboxState::default(),
        })
    }

    async fn run_tick(
        &self,
        state: &mut SandboxState,
        force_provision: bool,
    ) -> Result<TickReport, TickError> {
        let now = self.clock.now();

        let rotation_due = state
            .last_rotation_at
            .is_some_and(|t| (now - t).to_std().unwrap_or_default() >= self.config.rotation_interval);

        let health = if force_provision {
            ProbeOutcome::unhealthy("force-provision-request")
        } else if let Some(active) = &state.active {
            self.prober.probe(&active.url, "active").await
        } else {
            ProbeOutcome::unhealthy("no-active-sandbox")
        };

        if health.is_healthy() {
            if let Some(active) = &state.active {
                self.keepalive.ping(&active.url).await;
            }
        }

        let should_provision = force_provision || !health.is_healthy() || rotation_due;

        let mut provisioned = false;
        if should_provision {
            let reason = provision_reason(force_provision, &health, rotation_due);
            info!(reason, "provisioning a replacement sandbox");

            let new_handle = self.provision_with_retry(&reason).await?;
            self.wait_for_readiness(&new_handle).await?;

            let previous = state.active.take();
            self.promote(&new_handle, previous.as_ref()).await?;

            state.active = Some(SandboxRecord {
                id: new_handle.id.clone(),
                url: new_handle.url.clone(),
                created_at: now,
                status: SandboxStatus::Healthy,
            });
            state.last_rotation_at = Some(now);

            if let Some(previous) = previous {
                state.draining.push(DrainingSandboxRecord {
                    record: previous,
                    drain_started_at: now,
                });
            }
            provisioned = true;
        }

        self.drain(state, now).await;

        state.last_check_at = Some(now);
        state.last_failure = None;
        self.persist(state).await?;

        Ok(TickReport {
            provisioned,
            reason: if provisioned {
                Some(provision_reason(force_provision, &health, rotation_due))
            } else {
                None
            },
            active_url: state.active.as_ref().map(|a| a.url.clone()),
        })
    }

    async fn provision_with_retry(&self, reason: &str) -> Result<SandboxHandle, TickError> {
        let retry_config = RetryConfig {
            max_retries: self.config.provision_max_retries,
            initial_delay: self.config.provision_initial_backoff,
            max_delay: self.config.provision_initial_backoff * 16,
            multiplier: 2.0,
            jitter: false,
        };
        let executor = RetryExecutor::new(retry_config);
        let span = tracing::info_span!("provision", reason);

        executor
            .execute(|_attempt| {
                create_and_bootstrap(self.provider.as_ref(), &self.sandbox_spec, &self.bootstrap)
            })
            .instrument(span)
            .await
            .map_err(TickError::Provider)
    }

    /// Poll until healthy or the deadline elapses. Uses real wall-clock time
    /// via `tokio::time::timeout` rather than the injected [`Clock`] — this
    /// is a short-lived bounded wait, not a rotation-cadence decision.
    async fn wait_for_readiness(&self, handle: &SandboxHandle) -> Result<(), TickError> {
        let poll_interval = self.config.readiness_poll_interval;
        let poll = async {
            loop {
                let outcome = self.prober.probe(&handle.url, "candidate").await;
                if outcome.is_healthy() {
                    return;
                }
                sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(self.config.readiness_deadline, poll)
            .await
            .map_err(|_| TickError::HealthTimeout {
                id: handle.id.clone(),
            })
    }

    async fn promote(
        &self,
        new: &SandboxHandle,
        previous: Option<&SandboxRecord>,
    ) -> Result<(), TickError> {
        let mut ops = vec![
            WriteOp::upsert(keys::SANDBOX_ACTIVE_URL, &new.url),
            WriteOp::upsert(keys::SANDBOX_LAST_KNOWN_GOOD_URL, &new.url),
        ];
        if let Some(previous) = previous {
            ops.push(WriteOp::upsert(keys::SANDBOX_PREVIOUS_URL, &previous.url));
        }
        self.store.apply(ops).await?;
        Ok(())
    }

    async fn drain(&self, state: &mut SandboxState, now: chrono::DateTime<chrono::Utc>) {
        let grace = chrono::Duration::from_std(self.config.drain_grace).unwrap_or_default();
        let mut survivors = Vec::with_capacity(state.draining.len());

        for record in state.draining.drain(..) {
            if now - record.drain_started_at < grace {
                survivors.push(record);
                continue;
            }

            // Aged out: always removed from `draining`, regardless of stop
            // outcome. A 404 means the sandbox is already gone; any other
            // stop error is logged louder but does not retain the record
            // (bounded one-tick cost, per the rotation cadence).
            match self.provider.get(&record.record.id).await {
                Ok(handle) => match self.provider.stop(&handle).await {
                    Ok(()) => info!(sandbox_id = %record.record.id, "drained sandbox stopped"),
                    Err(ProviderError::NotFound { .. }) => {
                        info!(sandbox_id = %record.record.id, "drained sandbox already gone");
                    }
                    Err(err) => {
                        warn!(sandbox_id = %record.record.id, error = %err, "failed to stop drained sandbox");
                    }
                },
                Err(ProviderError::NotFound { .. }) => {
                    info!(sandbox_id = %record.record.id, "drained sandbox already gone");
                }
                Err(err) => {
                    warn!(sandbox_id = %record.record.id, error = %err, "failed to look up drained sandbox");
                }
            }
        }

        state.draining = survivors;
    }

    async fn persist(&self, state: &SandboxState) -> Result<(), TickError> {
        let value = serde_json::to_value(state).unwrap_or(serde_json::Value::Null);
        self.store
            .apply(vec![WriteOp::upsert(keys::SANDBOX_STATE, value)])
            .await?;
        Ok(())
    }

    async fn record_failure(&self, loaded: &SandboxState, err: &TickError) {
        let mut state = loaded.deep_clone();
        state.last_failure = Some(LastFailure {
            reason: err.reason(),
            at: self.clock.now(),
        });
        if let Err(store_err) = self.persist(&state).await {
            warn!(error = %store_err, "failed to persist lastFailure after tick error");
        }
    }
}

fn provision_reason(force_provision: bool, health: &ProbeOutcome, rotation_due: bool) -> String {
    if force_provision {
        return "force-provision-request".to_string();
    }
    if let ProbeOutcome::Unhealthy { reason } = health {
        return reason.clone();
    }
    if rotation_due {
        return "rotation-due".to_string();
    }
    "rotation-due".to_string()
}
