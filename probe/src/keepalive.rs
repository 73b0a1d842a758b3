//! Best-effort keepalive pinging of the active backend

use async_trait::async_trait;
use tracing::warn;

/// Fire-and-forget ping of a backend, used to keep it warm between ticks
#[async_trait]
pub trait KeepalivePing: Send + Sync {
    async fn ping(&self, base_url: &str);
}

/// Fire-and-forget `GET {base_url}/internal/keepalive`. Errors are logged
/// and never propagated — a keepalive failure never marks a backend
/// unhealthy.
pub struct KeepalivePinger {
    client: reqwest::Client,
    token: String,
}

impl KeepalivePinger {
    #[must_use]
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl KeepalivePing for KeepalivePinger {
    async fn ping(&self, base_url: &str) {
        let url = format!("{}/internal/keepalive", base_url.trim_end_matches('/'));

        let result = self
            .client
            .get(&url)
            .header("x-keepalive-token", &self.token)
            .header("user-agent", "sandbox-keepalive/1.0")
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(url, status = %response.status(), "keepalive ping rejected");
            }
            Err(err) => warn!(url, error = %err, "keepalive ping failed"),
            Ok(_) => {}
        }
    }
}
