//! # Kubernetes Stores
//!
//! [`ResourceStore`] and [`NamespaceStore`] backed by the API server. Writes are merge patches
//! carrying `metadata.resourceVersion`, which the API server treats as a precondition and
//! rejects with 409 when the object moved on.

use super::{NamespaceStore, ResourceStore, StoreError, VersionedAnnotation};
use crate::constants::FIELD_MANAGER;
use crate::crd::{ManagedResource, ResourceKey};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::marker::PhantomData;
use tracing::debug;

/// Managed resources of kind `K`, read and written through the API server
#[derive(Clone)]
pub struct KubeResourceStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for KubeResourceStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceStore").finish_non_exhaustive()
    }
}

impl<K: ManagedResource> KubeResourceStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name<K: ManagedResource>(resource: &K) -> String {
    format!(
        "{} {}",
        K::kind_name(),
        ResourceKey::from_resource(resource)
    )
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeResourceStore<K> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, format!("{} {key}", K::kind_name())))
    }

    async fn replace_status(&self, resource: &K) -> Result<K, StoreError> {
        let key = ResourceKey::from_resource(resource);
        let status = resource.status().cloned().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": resource.resource_version() },
            "status": status,
        });
        debug!(resource = %key, "writing status");
        self.api(&key.namespace)
            .patch_status(&key.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, object_name(resource)))
    }

    async fn replace_finalizers(&self, resource: &K, finalizers: Vec<String>) -> Result<K, StoreError> {
        let key = ResourceKey::from_resource(resource);
        let patch = json!({
            "metadata": {
                "resourceVersion": resource.resource_version(),
                "finalizers": finalizers,
            },
        });
        debug!(resource = %key, ?finalizers, "writing finalizers");
        self.api(&key.namespace)
            .patch(&key.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, object_name(resource)))
    }
}

/// Namespace annotations, read and written through the API server
#[derive(Clone)]
pub struct KubeNamespaceStore {
    api: Api<Namespace>,
}

impl std::fmt::Debug for KubeNamespaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNamespaceStore").finish_non_exhaustive()
    }
}

impl KubeNamespaceStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NamespaceStore for KubeNamespaceStore {
    async fn read_annotation(&self, namespace: &str, key: &str) -> Result<VersionedAnnotation, StoreError> {
        let ns = self
            .api
            .get(namespace)
            .await
            .map_err(|e| StoreError::from_kube(e, format!("namespace {namespace}")))?;
        let version = ns
            .resource_version()
            .ok_or_else(|| StoreError::Other(format!("namespace {namespace} has no resourceVersion")))?;
        Ok(VersionedAnnotation {
            value: ns.annotations().get(key).cloned(),
            version,
        })
    }

    async fn write_annotation(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        expected_version: &str,
    ) -> Result<(), StoreError> {
        let patch = json!({
            "metadata": {
                "resourceVersion": expected_version,
                "annotations": { key: value },
            },
        });
        self.api
            .patch(namespace, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, format!("namespace {namespace}")))?;
        Ok(())
    }
}
