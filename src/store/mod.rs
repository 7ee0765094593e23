//! # Stores
//!
//! Read/write access to the cluster state the controller owns a slice of:
//!
//! - [`ResourceStore`]: managed resources (status and finalizer writes only)
//! - [`NamespaceStore`]: versioned namespace annotations, used by the write guard
//!
//! Every write is preconditioned on the version that was read, so a concurrent writer
//! surfaces as [`StoreError::Conflict`] instead of a lost update.

mod kube_store;

pub use kube_store::{KubeNamespaceStore, KubeResourceStore};

use crate::crd::ResourceKey;
use async_trait::async_trait;
use thiserror::Error;

/// Error returned by a store operation
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist (or no longer exists)
    #[error("{0} not found")]
    NotFound(String),
    /// Optimistic-concurrency precondition failed
    #[error("conflict writing {0}: the object was modified concurrently")]
    Conflict(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Map a kube error, turning 404 and 409 responses into the typed variants
    pub fn from_kube(error: kube::Error, object: impl Into<String>) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound(object.into()),
            kube::Error::Api(response) if response.code == 409 => Self::Conflict(object.into()),
            _ => Self::Kube(error),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Access to managed resources of kind `K`
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the resource; `None` when it does not exist
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError>;

    /// Write the resource's status, preconditioned on its `resourceVersion`
    async fn replace_status(&self, resource: &K) -> Result<K, StoreError>;

    /// Replace the resource's finalizer list, preconditioned on its `resourceVersion`
    async fn replace_finalizers(&self, resource: &K, finalizers: Vec<String>) -> Result<K, StoreError>;
}

/// One annotation of a namespace together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedAnnotation {
    /// Current value, `None` when the annotation is absent
    pub value: Option<String>,
    /// Opaque version of the namespace object at read time
    pub version: String,
}

/// Versioned access to namespace annotations
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn read_annotation(&self, namespace: &str, key: &str) -> Result<VersionedAnnotation, StoreError>;

    /// Set `key` to `value` if the namespace is still at `expected_version`
    ///
    /// Fails with [`StoreError::Conflict`] if the namespace was modified since.
    async fn write_annotation(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        expected_version: &str,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_from_kube_maps_status_codes() {
        assert!(StoreError::from_kube(api_error(404), "ns/a").is_not_found());
        assert!(StoreError::from_kube(api_error(409), "ns/a").is_conflict());
        assert!(matches!(
            StoreError::from_kube(api_error(500), "ns/a"),
            StoreError::Kube(_)
        ));
    }

    #[test]
    fn test_conflict_message_names_object() {
        let err = StoreError::Conflict("namespace team-a".to_string());
        assert!(err.to_string().contains("namespace team-a"));
    }
}
