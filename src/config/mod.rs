//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables (populated from a ConfigMap
//! via `envFrom` in the deployment). All values have defaults from [`crate::constants`].

mod controller;
mod server;

pub use controller::{ControllerConfig, ProviderBackend};
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
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
