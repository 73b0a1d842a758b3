//! Error taxonomy for the rotation controller and routing gateway

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("state store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("sandbox provider error: {0}")]
    Provider(#[from] provider::ProviderError),

    #[error("sandbox {id} failed to become healthy in time")]
    HealthTimeout { id: String },
}

impl TickError {
    /// The human-readable reason recorded in `lastFailure.reason`
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            TickError::HealthTimeout { id } => {
                format!("sandbox {id} failed to become healthy in time")
            }
            other => other.to_string(),
        }
    }
}
