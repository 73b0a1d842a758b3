//! State store adapter for the sandbox fleet control plane
//!
//! This crate owns the shared [`models::SandboxState`] document and the
//! read/read-first/apply contract ([`client::StateStore`]) that both the
//! rotation controller and the routing gateway use to communicate through
//! an external, eventually-consistent key/value store.

pub mod client;
pub mod error;
pub mod keys;
pub mod models;
pub mod retry;

pub use client::{HttpStateStore, StateStore, WriteOp};
pub use error::StoreError;
pub use models::{DrainingSandboxRecord, LastFailure, SandboxRecord, SandboxState, SandboxStatus};
pub use retry::{RetryConfig, RetryExecutor};
