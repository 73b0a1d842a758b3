//! Named keys in the shared state store, and their legacy read fallbacks

/// Canonical key for the persisted [`crate::models::SandboxState`] document
pub const SANDBOX_STATE: &str = "sandbox_state";
/// Legacy dotted-form key, read-only fallback for `SANDBOX_STATE`
pub const SANDBOX_STATE_LEGACY: &str = "sandbox.state";

/// Canonical key for the currently serving backend URL
pub const SANDBOX_ACTIVE_URL: &str = "sandbox_active_url";
/// Legacy dotted-form key, read-only fallback for `SANDBOX_ACTIVE_URL`
pub const SANDBOX_ACTIVE_URL_LEGACY: &str = "sandbox.activeUrl";

/// Canonical key for the most recent instance that ever passed health
pub const SANDBOX_LAST_KNOWN_GOOD_URL: &str = "sandbox_last_known_good_url";
/// Legacy dotted-form key, read-only fallback for `SANDBOX_LAST_KNOWN_GOOD_URL`
pub const SANDBOX_LAST_KNOWN_GOOD_URL_LEGACY: &str = "sandbox.lastKnownGoodUrl";

/// Canonical key for the immediately prior backend (informational only)
pub const SANDBOX_PREVIOUS_URL: &str = "sandbox_previous_url";

/// Ordered `[canonical, legacy]` lookup list for the active-url routing pointer
#[must_use]
pub fn active_url_fallbacks() -> [&'static str; 2] {
    [SANDBOX_ACTIVE_URL, SANDBOX_ACTIVE_URL_LEGACY]
}

/// Ordered `[canonical, legacy]` lookup list for the last-known-good pointer
#[must_use]
pub fn last_known_good_fallbacks() -> [&'static str; 2] {
    [SANDBOX_LAST_KNOWN_GOOD_URL, SANDBOX_LAST_KNOWN_GOOD_URL_LEGACY]
}

/// Ordered `[canonical, legacy]` lookup list for the state document
#[must_use]
pub fn state_fallbacks() -> [&'static str; 2] {
    [SANDBOX_STATE, SANDBOX_STATE_LEGACY]
}
