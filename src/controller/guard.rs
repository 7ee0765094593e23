//! # Concurrent-Write Guard
//!
//! Compare-and-set of a namespace annotation shared by every resource in the namespace.
//!
//! Each attempt reads the annotation and its version, then:
//! - absent: writes the desired value, preconditioned on the read version
//! - equal: succeeds without writing
//! - different: fails with [`GuardError::SemanticConflict`], never retried
//!
//! A write that loses an optimistic-concurrency race restarts the whole read-compare-write
//! sequence after a random sleep, up to a bounded number of attempts.

use crate::constants::PROJECT_ID_ANNOTATION;
use crate::observability::metrics;
use crate::store::{NamespaceStore, StoreError};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error returned by [`compare_and_set_annotation`]
#[derive(Debug, Error)]
pub enum GuardError {
    /// The annotation already holds a different value
    #[error("namespace {namespace} already has {key}={existing}, refusing to set it to {desired}")]
    SemanticConflict {
        namespace: String,
        key: String,
        existing: String,
        desired: String,
    },
    /// Every attempt lost an optimistic-concurrency race
    #[error("giving up on {key} in namespace {namespace} after {attempts} conflicting writes")]
    Exhausted {
        namespace: String,
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Retry bounds for the compare-and-set loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    pub max_attempts: u32,
    /// Upper bound of the uniform random sleep between attempts
    pub max_jitter: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_ANNOTATION_MAX_ATTEMPTS,
            max_jitter: Duration::from_millis(crate::constants::DEFAULT_ANNOTATION_RETRY_JITTER_MS),
        }
    }
}

impl GuardPolicy {
    pub fn from_config(config: &crate::config::ControllerConfig) -> Self {
        Self {
            max_attempts: config.annotation_max_attempts.max(1),
            max_jitter: config.annotation_retry_jitter,
        }
    }

    fn backoff(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        self.max_jitter.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
    }
}

/// Set `key` on `namespace` to `desired` unless it already holds another value
pub async fn compare_and_set_annotation(
    store: &dyn NamespaceStore,
    policy: &GuardPolicy,
    namespace: &str,
    key: &str,
    desired: &str,
) -> Result<(), GuardError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = store.read_annotation(namespace, key).await?;
        match current.value.as_deref() {
            Some(existing) if existing == desired => {
                debug!(namespace, key, value = desired, "annotation already set");
                return Ok(());
            }
            Some(existing) => {
                return Err(GuardError::SemanticConflict {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    existing: existing.to_string(),
                    desired: desired.to_string(),
                });
            }
            None => {}
        }

        match store.write_annotation(namespace, key, desired, &current.version).await {
            Ok(()) => {
                info!(namespace, key, value = desired, attempt, "annotation set");
                return Ok(());
            }
            Err(err) if err.is_conflict() => {
                metrics::increment_annotation_conflicts();
                if attempt >= policy.max_attempts {
                    warn!(namespace, key, attempt, "annotation write kept conflicting, giving up");
                    return Err(GuardError::Exhausted {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.backoff();
                debug!(namespace, key, attempt, ?delay, "annotation write conflicted, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Bind `namespace` to `project` through the project-id annotation
pub async fn ensure_namespace_project(
    store: &dyn NamespaceStore,
    policy: &GuardPolicy,
    namespace: &str,
    project: &str,
) -> Result<(), GuardError> {
    compare_and_set_annotation(store, policy, namespace, PROJECT_ID_ANNOTATION, project).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNamespaceStore;

    fn policy() -> GuardPolicy {
        GuardPolicy {
            max_attempts: 10,
            max_jitter: Duration::from_millis(1000),
        }
    }

    #[tokio::test]
    async fn test_absent_annotation_is_written() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        ensure_namespace_project(&store, &policy(), "team-a", "proj-123")
            .await
            .unwrap();
        assert_eq!(
            store.annotation("team-a", PROJECT_ID_ANNOTATION).as_deref(),
            Some("proj-123")
        );
    }

    #[tokio::test]
    async fn test_equal_value_is_noop() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        store.set_annotation("team-a", PROJECT_ID_ANNOTATION, "proj-123");
        let writes_before = store.write_count();
        ensure_namespace_project(&store, &policy(), "team-a", "proj-123")
            .await
            .unwrap();
        assert_eq!(store.write_count(), writes_before);
    }

    #[tokio::test]
    async fn test_different_value_is_semantic_conflict() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        store.set_annotation("team-a", PROJECT_ID_ANNOTATION, "proj-123");
        let err = ensure_namespace_project(&store, &policy(), "team-a", "proj-456")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("proj-123"), "{message}");
        assert!(message.contains("proj-456"), "{message}");
        assert!(matches!(err, GuardError::SemanticConflict { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_are_retried_then_succeed() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        store.inject_conflicts(3);
        ensure_namespace_project(&store, &policy(), "team-a", "proj-123")
            .await
            .unwrap();
        assert_eq!(
            store.annotation("team-a", PROJECT_ID_ANNOTATION).as_deref(),
            Some("proj-123")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_exhaust_after_max_attempts() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        store.inject_conflicts(u32::MAX);
        let err = ensure_namespace_project(&store, &policy(), "team-a", "proj-123")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Exhausted { attempts: 10, .. }));
    }

    #[tokio::test]
    async fn test_missing_namespace_is_store_error() {
        let store = InMemoryNamespaceStore::new();
        let err = ensure_namespace_project(&store, &policy(), "nope", "proj-123")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Store(StoreError::NotFound(_))));
    }
}
