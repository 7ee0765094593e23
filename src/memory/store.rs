//! In-memory resource and namespace stores

use super::lock;
use crate::crd::{ManagedResource, ResourceKey};
use crate::store::{NamespaceStore, ResourceStore, StoreError, VersionedAnnotation};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

/// Take one unit from a conflict budget, if any is left
fn take_conflict(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Managed resources of kind `K`
#[derive(Debug)]
pub struct InMemoryResourceStore<K> {
    objects: Mutex<BTreeMap<ResourceKey, K>>,
    version: AtomicU64,
    status_writes: AtomicUsize,
    pending_conflicts: AtomicU32,
}

impl<K: ManagedResource> Default for InMemoryResourceStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ManagedResource> InMemoryResourceStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            status_writes: AtomicUsize::new(0),
            pending_conflicts: AtomicU32::new(0),
        }
    }

    fn next_version(&self) -> Option<String> {
        Some((self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string())
    }

    /// Create a resource as an external actor would: generation 1, fresh version
    pub fn insert(&self, mut resource: K) -> ResourceKey {
        let meta = resource.meta_mut();
        meta.namespace.get_or_insert_with(|| "default".to_string());
        meta.generation = Some(meta.generation.unwrap_or(1));
        meta.resource_version = self.next_version();
        let key = ResourceKey::from_resource(&resource);
        lock(&self.objects).insert(key.clone(), resource);
        key
    }

    /// Apply a spec change as an external actor would, bumping the generation
    pub fn update_spec(&self, key: &ResourceKey, change: impl FnOnce(&mut K)) -> Option<K> {
        let mut objects = lock(&self.objects);
        let resource = objects.get_mut(key)?;
        change(resource);
        let meta = resource.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(0) + 1);
        meta.resource_version = self.next_version();
        Some(resource.clone())
    }

    /// Request deletion: objects holding finalizers are only marked
    pub fn delete(&self, key: &ResourceKey) {
        let mut objects = lock(&self.objects);
        let Some(resource) = objects.get_mut(key) else {
            return;
        };
        if resource.finalizers().is_empty() {
            objects.remove(key);
            return;
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let meta = resource.meta_mut();
        meta.deletion_timestamp = serde_json::from_value(serde_json::Value::String(now)).ok();
        meta.resource_version = self.next_version();
    }

    /// Remove an object outright, bypassing finalizers
    pub fn remove(&self, key: &ResourceKey) -> Option<K> {
        lock(&self.objects).remove(key)
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Option<K> {
        lock(&self.objects).get(key).cloned()
    }

    /// Number of status writes accepted so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Fail the next `count` writes with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Precondition check shared by both write paths
    fn checked<'a>(
        &self,
        objects: &'a mut BTreeMap<ResourceKey, K>,
        resource: &K,
    ) -> Result<(ResourceKey, &'a mut K), StoreError> {
        let key = ResourceKey::from_resource(resource);
        let object = format!("{} {key}", K::kind_name());
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound(object));
        };
        if take_conflict(&self.pending_conflicts) || stored.resource_version() != resource.resource_version() {
            return Err(StoreError::Conflict(object));
        }
        Ok((key, stored))
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for InMemoryResourceStore<K> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        Ok(self.snapshot(key))
    }

    async fn replace_status(&self, resource: &K) -> Result<K, StoreError> {
        let mut objects = lock(&self.objects);
        let (_, stored) = self.checked(&mut objects, resource)?;
        *stored.status_mut() = resource.status().cloned().unwrap_or_default();
        stored.meta_mut().resource_version = self.next_version();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn replace_finalizers(&self, resource: &K, finalizers: Vec<String>) -> Result<K, StoreError> {
        let mut objects = lock(&self.objects);
        let (key, stored) = self.checked(&mut objects, resource)?;
        stored.meta_mut().finalizers = Some(finalizers);
        stored.meta_mut().resource_version = self.next_version();
        let updated = stored.clone();
        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(updated)
    }
}

#[derive(Debug, Default)]
struct NamespaceRecord {
    annotations: BTreeMap<String, String>,
    version: u64,
}

/// Namespaces and their annotations
#[derive(Debug, Default)]
pub struct InMemoryNamespaceStore {
    namespaces: Mutex<BTreeMap<String, NamespaceRecord>>,
    writes: AtomicUsize,
    pending_conflicts: AtomicU32,
    rendezvous: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl InMemoryNamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_namespace(&self, namespace: &str) {
        lock(&self.namespaces)
            .entry(namespace.to_string())
            .or_insert_with(|| NamespaceRecord {
                version: 1,
                ..NamespaceRecord::default()
            });
    }

    /// Set an annotation as an external writer would, creating the namespace if needed
    pub fn set_annotation(&self, namespace: &str, key: &str, value: &str) {
        let mut namespaces = lock(&self.namespaces);
        let record = namespaces.entry(namespace.to_string()).or_default();
        record.annotations.insert(key.to_string(), value.to_string());
        record.version += 1;
    }

    pub fn annotation(&self, namespace: &str, key: &str) -> Option<String> {
        lock(&self.namespaces)
            .get(namespace)
            .and_then(|record| record.annotations.get(key).cloned())
    }

    /// Number of annotation writes accepted through [`NamespaceStore::write_annotation`]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fail the next `count` writes as if another writer had modified the namespace
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Hold the next `parties` reads until all of them have read
    ///
    /// Forces concurrent callers to observe the same version, so all but one of their
    /// writes conflict.
    pub fn synchronize_reads(&self, parties: usize) {
        *lock(&self.rendezvous) = Some((Arc::new(Barrier::new(parties)), parties));
    }
}

#[async_trait]
impl NamespaceStore for InMemoryNamespaceStore {
    async fn read_annotation(&self, namespace: &str, key: &str) -> Result<VersionedAnnotation, StoreError> {
        let read = {
            let namespaces = lock(&self.namespaces);
            let record = namespaces
                .get(namespace)
                .ok_or_else(|| StoreError::NotFound(format!("namespace {namespace}")))?;
            VersionedAnnotation {
                value: record.annotations.get(key).cloned(),
                version: record.version.to_string(),
            }
        };

        let barrier = {
            let mut slot = lock(&self.rendezvous);
            match slot.as_mut() {
                Some((barrier, remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(Arc::clone(barrier))
                }
                _ => None,
            }
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(read)
    }

    async fn write_annotation(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        expected_version: &str,
    ) -> Result<(), StoreError> {
        let mut namespaces = lock(&self.namespaces);
        let record = namespaces
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NotFound(format!("namespace {namespace}")))?;
        if take_conflict(&self.pending_conflicts) {
            // Another writer touched the namespace in between
            record.version += 1;
            return Err(StoreError::Conflict(format!("namespace {namespace}")));
        }
        if record.version.to_string() != expected_version {
            return Err(StoreError::Conflict(format!("namespace {namespace}")));
        }
        record.annotations.insert(key.to_string(), value.to_string());
        record.version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MonitoringService, MonitoringServiceSpec};

    fn service() -> MonitoringService {
        let mut service = MonitoringService::new("checkout", MonitoringServiceSpec::default());
        service.metadata.namespace = Some("team-a".to_string());
        service
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryResourceStore::new();
        let key = store.insert(service());
        let stale = store.snapshot(&key).unwrap();
        store.update_spec(&key, |s| s.spec.display_name = Some("new".to_string()));
        let err = store.replace_status(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_spec_bumps_generation() {
        let store = InMemoryResourceStore::new();
        let key = store.insert(service());
        let updated = store
            .update_spec(&key, |s| s.spec.display_name = Some("new".to_string()))
            .unwrap();
        assert_eq!(updated.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_removing_last_finalizer_of_deleting_object_removes_it() {
        let store = InMemoryResourceStore::new();
        let key = store.insert(service());
        let current = store.snapshot(&key).unwrap();
        store
            .replace_finalizers(&current, vec!["example.com/f".to_string()])
            .await
            .unwrap();
        store.delete(&key);
        let deleting = store.snapshot(&key).unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());
        store.replace_finalizers(&deleting, Vec::new()).await.unwrap();
        assert!(store.snapshot(&key).is_none());
    }

    #[tokio::test]
    async fn test_namespace_write_requires_read_version() {
        let store = InMemoryNamespaceStore::new();
        store.create_namespace("team-a");
        let read = store.read_annotation("team-a", "k").await.unwrap();
        store.set_annotation("team-a", "other", "x");
        let err = store
            .write_annotation("team-a", "k", "v", &read.version)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
