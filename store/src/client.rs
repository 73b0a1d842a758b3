//! HTTP-backed client for the shared, eventually-consistent config store

use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One operation in a batched [`StateStore::apply`] write
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum WriteOp {
    Upsert { key: String, value: Value },
    Delete { key: String },
}

impl WriteOp {
    #[must_use]
    pub fn upsert(key: impl Into<String>, value: impl Serialize) -> Self {
        WriteOp::Upsert {
            key: key.into(),
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }

    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }
}

#[derive(Debug, Serialize)]
struct ApplyBody {
    items: Vec<WriteOp>,
}

/// Read/write access to the shared key/value config store
///
/// Reads may return stale data; writes are observed by subsequent reads
/// within seconds. A failed [`Self::apply`] leaves the store unchanged.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the current value for `key`, or `None` if it has never been set
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Try each key in order, returning the first non-null value found
    async fn read_first(&self, keys: &[&str]) -> Result<Option<Value>, StoreError> {
        for key in keys {
            if let Some(value) = self.read(key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Atomically apply a batch of upserts/deletes in a single request
    async fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

/// [`StateStore`] implementation backed by an edge-config-style HTTP API
pub struct HttpStateStore {
    client: reqwest::Client,
    base_url: String,
    config_id: String,
    token: String,
}

impl HttpStateStore {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String, config_id: String, token: String) -> Self {
        Self {
            client,
            base_url,
            config_id,
            token,
        }
    }

    fn item_url(&self, key: &str) -> String {
        format!(
            "{}/v1/edge-config/{}/item/{}",
            self.base_url.trim_end_matches('/'),
            self.config_id,
            key
        )
    }

    fn items_url(&self) -> String {
        format!(
            "{}/v1/edge-config/{}/items",
            self.base_url.trim_end_matches('/'),
            self.config_id
        )
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        debug!(key, "reading state store key");
        let response = self
            .client
            .get(self.item_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status,
                key: key.to_string(),
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str::<Value>(&body)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        debug!(count = ops.len(), "applying state store batch write");
        let response = self
            .client
            .patch(self.items_url())
            .bearer_auth(&self.token)
            .json(&ApplyBody { items: ops })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status,
                key: "items".to_string(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_url_strips_trailing_slash_from_base() {
        let store = HttpStateStore::new(
            reqwest::Client::new(),
            "https://edge.example/".to_string(),
            "cfg123".to_string(),
            "tok".to_string(),
        );
        assert_eq!(
            store.item_url("sandbox_active_url"),
            "https://edge.example/v1/edge-config/cfg123/item/sandbox_active_url"
        );
    }

    #[test]
    fn items_url_is_the_batch_endpoint() {
        let store = HttpStateStore::new(
            reqwest::Client::new(),
            "https://edge.example".to_string(),
            "cfg123".to_string(),
            "tok".to_string(),
        );
        assert_eq!(
            store.items_url(),
            "https://edge.example/v1/edge-config/cfg123/items"
        );
    }

    #[test]
    fn write_op_serializes_with_tagged_operation_field() {
        let op = WriteOp::upsert("sandbox_active_url", "https://sbx-1.example");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation"], "upsert");
        assert_eq!(json["key"], "sandbox_active_url");
        assert_eq!(json["value"], "https://sbx-1.example");

        let del = WriteOp::delete("sandbox_previous_url");
        let json = serde_json::to_value(&del).unwrap();
        assert_eq!(json["operation"], "delete");
    }
}
