//! Error taxonomy for sandbox provisioning and bootstrap

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider reported the sandbox/handle does not exist (HTTP 404)
    #[error("sandbox {id} not found")]
    NotFound { id: String },

    #[error("sandbox provider returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("sandbox provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap step '{step}' exited with status {exit_code}: {tail}")]
    NonZeroExit {
        step: &'static str,
        exit_code: i32,
        tail: String,
    },

    #[error("bootstrap step '{step}' produced no exit status")]
    NoExitStatus { step: &'static str },
}
