//! Sandbox provisioning: create, inspect, stop instances, and run the
//! bootstrap sequence that turns a bare instance into a serving backend.

pub mod bootstrap;
pub mod client;
pub mod error;
pub mod models;

pub use bootstrap::{create_and_bootstrap, BootstrapConfig};
pub use client::{HttpSandboxProvider, SandboxProvider};
pub use error::{BootstrapError, ProviderError};
pub use models::{CommandOutcome, CommandSpec, ProviderCredentials, SandboxHandle, SandboxSpec};
