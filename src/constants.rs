//! # Constants
//!
//! Controller-wide defaults. Every timing value here can be overridden through
//! the environment (see [`crate::config`]).

/// Mean interval between periodic resyncs of a healthy resource (seconds)
///
/// Callers jitter around this value so resources do not resync in lockstep.
pub const DEFAULT_MEAN_RECONCILE_PERIOD_SECS: u64 = 10 * 60;

/// Number of consecutive transient failures that are retried on the short interval
pub const DEFAULT_TRANSIENT_MAX_RETRIES: u32 = 5;

/// Delay before retrying a transient failure (seconds)
pub const DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS: u64 = 5;

/// Attempts of the namespace annotation read-modify-write before giving up
pub const DEFAULT_ANNOTATION_MAX_ATTEMPTS: u32 = 10;

/// Upper bound of the random sleep between annotation write attempts (milliseconds)
pub const DEFAULT_ANNOTATION_RETRY_JITTER_MS: u64 = 1000;

/// Namespace annotation binding a namespace to a provider project
pub const PROJECT_ID_ANNOTATION: &str = "cnrm.cloud.google.com/project-id";

/// Finalizer placed on managed resources before the remote object is created
pub const FINALIZER: &str = "cnrm.cloud.google.com/finalizer";

/// Field manager used for status and metadata writes
pub const FIELD_MANAGER: &str = "cloud-resource-controller";

/// Condition type reported on every managed resource
pub const READY_CONDITION: &str = "Ready";

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// How long to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to poll for HTTP server readiness during startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default provider API endpoint for the REST actuator
pub const DEFAULT_PROVIDER_ENDPOINT: &str = "https://cloudresources.googleapis.com";
