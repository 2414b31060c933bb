//! # Operator Configuration
//!
//! Operator settings loaded from environment variables (populated from a ConfigMap
//! through `envFrom` in the deployment). Every setting has a default; command-line
//! flags override what the environment provides.

mod controller;
mod server;

pub use controller::{parse_classes, ControllerConfig};
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
#[must_use]
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read an optional environment variable, treating blank values as unset
pub(crate) fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
