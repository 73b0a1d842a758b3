//! Health probing of a sandbox backend

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_millis(8_000);

/// Result of probing a backend's `/api/health` endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Healthy { payload: Value },
    Unhealthy { reason: String },
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy { .. })
    }

    #[must_use]
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unhealthy {
            reason: reason.into(),
        }
    }
}

/// Issue the health probe against a backend's base URL
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, base_url: &str, role: &str) -> ProbeOutcome;
}

/// [`HealthProbe`] implementation that hits `GET {base_url}/api/health`
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, base_url: &str, role: &str) -> ProbeOutcome {
        let url = format!("{}/api/health", base_url.trim_end_matches('/'));
        debug!(url, role, "probing sandbox health");

        let request = self
            .client
            .get(&url)
            .header("user-agent", "sandbox-watchdog/1.0")
            .header("x-sandbox-bypass", "true")
            .send();

        let response = match tokio::time::timeout(PROBE_TIMEOUT, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return ProbeOutcome::unhealthy(err.to_string()),
            Err(_) => return ProbeOutcome::unhealthy("probe timed out after 8000ms"),
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::unhealthy(format!("health-status-{}", status.as_u16()));
        }

        let body = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str(&body).unwrap_or(Value::Object(serde_json::Map::new()));
        ProbeOutcome::Healthy { payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_status_reason_includes_status_code() {
        let outcome = ProbeOutcome::unhealthy("health-status-503");
        assert!(!outcome.is_healthy());
        match outcome {
            ProbeOutcome::Unhealthy { reason } => assert_eq!(reason, "health-status-503"),
            ProbeOutcome::Healthy { .. } => panic!("expected unhealthy"),
        }
    }

    #[test]
    fn healthy_outcome_reports_healthy() {
        let outcome = ProbeOutcome::Healthy {
            payload: Value::Null,
        };
        assert!(outcome.is_healthy());
    }
}
