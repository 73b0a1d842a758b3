//! Error taxonomy for the state store adapter

use thiserror::Error;

/// Errors surfaced by [`crate::client::StateStore`] operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store returned status {status} for {key}: {body}")]
    Http {
        status: u16,
        key: String,
        body: String,
    },

    #[error("state store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode state store response for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether the caller may reasonably retry this failure.
    ///
    /// A bad response body or malformed JSON will not heal by retrying; a
    /// transport-level failure or a 5xx from the store might.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Http { status, .. } => *status >= 500,
            StoreError::Decode { .. } => false,
        }
    }
}
