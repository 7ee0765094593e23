//! # Reconciler Settings
//!
//! Scheduling and provider settings loaded from environment variables.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_ANNOTATION_MAX_ATTEMPTS, DEFAULT_ANNOTATION_RETRY_JITTER_MS,
    DEFAULT_MEAN_RECONCILE_PERIOD_SECS, DEFAULT_PROVIDER_ENDPOINT, DEFAULT_TRANSIENT_MAX_RETRIES,
    DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS,
};
use std::str::FromStr;
use std::time::Duration;

/// Which actuator implementation talks to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderBackend {
    /// JSON over HTTPS against `PROVIDER_ENDPOINT`
    Rest,
    /// Process-local simulated provider, for local clusters and demos
    Memory,
}

impl FromStr for ProviderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown provider backend '{other}'")),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Mean interval between periodic resyncs of healthy resources
    pub mean_reconcile_period: Duration,
    /// Consecutive transient failures retried on the short interval
    pub transient_max_retries: u32,
    /// Short delay used for transient retries
    pub transient_retry_interval: Duration,
    /// Attempts of the namespace annotation compare-and-set
    pub annotation_max_attempts: u32,
    /// Upper bound of the random sleep between annotation attempts
    pub annotation_retry_jitter: Duration,
    /// Actuator implementation
    pub provider_backend: ProviderBackend,
    /// Base URL of the provider API
    pub provider_endpoint: String,
    /// Optional bearer token sent to the provider API
    pub provider_token: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mean_reconcile_period: Duration::from_secs(DEFAULT_MEAN_RECONCILE_PERIOD_SECS),
            transient_max_retries: DEFAULT_TRANSIENT_MAX_RETRIES,
            transient_retry_interval: Duration::from_secs(DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS),
            annotation_max_attempts: DEFAULT_ANNOTATION_MAX_ATTEMPTS,
            annotation_retry_jitter: Duration::from_millis(DEFAULT_ANNOTATION_RETRY_JITTER_MS),
            provider_backend: ProviderBackend::Rest,
            provider_endpoint: DEFAULT_PROVIDER_ENDPOINT.to_string(),
            provider_token: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            mean_reconcile_period: Duration::from_secs(env_var_or_default(
                "MEAN_RECONCILE_PERIOD_SECS",
                DEFAULT_MEAN_RECONCILE_PERIOD_SECS,
            )),
            transient_max_retries: env_var_or_default(
                "TRANSIENT_MAX_RETRIES",
                DEFAULT_TRANSIENT_MAX_RETRIES,
            ),
            transient_retry_interval: Duration::from_secs(env_var_or_default(
                "TRANSIENT_RETRY_INTERVAL_SECS",
                DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS,
            )),
            annotation_max_attempts: env_var_or_default(
                "ANNOTATION_MAX_ATTEMPTS",
                DEFAULT_ANNOTATION_MAX_ATTEMPTS,
            ),
            annotation_retry_jitter: Duration::from_millis(env_var_or_default(
                "ANNOTATION_RETRY_JITTER_MS",
                DEFAULT_ANNOTATION_RETRY_JITTER_MS,
            )),
            provider_backend: env_var_or_default("PROVIDER_BACKEND", ProviderBackend::Rest),
            provider_endpoint: std::env::var("PROVIDER_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_ENDPOINT.to_string()),
            provider_token: std::env::var("PROVIDER_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.mean_reconcile_period, Duration::from_secs(600));
        assert_eq!(config.transient_max_retries, 5);
        assert_eq!(config.transient_retry_interval, Duration::from_secs(5));
        assert_eq!(config.annotation_max_attempts, 10);
        assert_eq!(config.provider_backend, ProviderBackend::Rest);
    }

    #[test]
    fn test_provider_backend_parsing() {
        assert_eq!("REST".parse::<ProviderBackend>(), Ok(ProviderBackend::Rest));
        assert_eq!("memory".parse::<ProviderBackend>(), Ok(ProviderBackend::Memory));
        assert_eq!("in-memory".parse::<ProviderBackend>(), Ok(ProviderBackend::Memory));
        assert!("grpc".parse::<ProviderBackend>().is_err());
    }
}
