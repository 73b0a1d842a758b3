//! Health probing and keepalive pinging of sandbox backends

pub mod health;
pub mod keepalive;

pub use health::{HealthProbe, HttpHealthProbe, ProbeOutcome};
pub use keepalive::{KeepalivePing, KeepalivePinger};
