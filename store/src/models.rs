//! Data model for the shared sandbox fleet state document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a provisioned sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Provisioning,
    Healthy,
    Unhealthy,
}

/// The canonical description of one provisioned instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxRecord {
    /// Opaque id assigned by the provider; stable for the life of the sandbox
    pub id: String,
    /// Absolute base URL (scheme + host), externally reachable
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub status: SandboxStatus,
}

/// A previously-active sandbox retained for the drain grace window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainingSandboxRecord {
    #[serde(flatten)]
    pub record: SandboxRecord,
    pub drain_started_at: DateTime<Utc>,
}

/// A failure observed on the most recent tick that did not reach persist-success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastFailure {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The single persisted state document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxState {
    pub active: Option<SandboxRecord>,
    #[serde(default)]
    pub draining: Vec<DrainingSandboxRecord>,
    pub last_rotation_at: Option<DateTime<Utc>>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_failure: Option<LastFailure>,
}

impl SandboxState {
    /// Produce a structurally independent copy with no aliased sub-objects.
    ///
    /// Implemented as a serialize/deserialize round trip, matching the
    /// "deep clone via JSON round-trip" design note: any shared nested data
    /// (the `draining` vector, the `active` record) is fully owned by the
    /// returned value.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        serde_json::to_value(self)
            .and_then(serde_json::from_value)
            .unwrap_or_else(|_| self.clone())
    }

    /// True if `id` is not present anywhere in the draining list (invariant I2)
    #[must_use]
    pub fn draining_contains(&self, id: &str) -> bool {
        self.draining.iter().any(|d| d.record.id == id)
    }
}
