//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a boolean.
///
/// Returns `None` when the variable is unset, so callers can tell
/// "explicitly false" apart from "not configured".
pub fn get_bool(name: &str) -> Option<bool> {
    get_var(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Common environment variable names.
pub mod vars {
    /// Wiregate home directory override.
    pub const WIREGATE_HOME: &str = "WIREGATE_HOME";

    /// Wiregate config file override.
    pub const WIREGATE_CONFIG: &str = "WIREGATE_CONFIG";

    /// Gateway port override.
    pub const WIREGATE_PORT: &str = "WIREGATE_PORT";

    /// Forces every call to arrive encrypted.
    pub const WIREGATE_ENCRYPTION_REQUIRED: &str = "WIREGATE_ENCRYPTION_REQUIRED";

    /// Session idle timeout override, in seconds.
    pub const WIREGATE_SESSION_TIMEOUT: &str = "WIREGATE_SESSION_TIMEOUT";
}
