//! Shared fixtures for the integration tests: a reconciler wired to in-memory backends

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use cloud_resource_controller::constants::READY_CONDITION;
use cloud_resource_controller::controller::reconciler::{DependencyResolver, Reconciler};
use cloud_resource_controller::controller::schedule::SchedulePolicy;
use cloud_resource_controller::crd::{
    find_condition, Condition, ManagedResource, ManagedStatus, RepositoryPubsubConfig, ResourceKey,
    ResourceRef, SourceRepoRepository, SourceRepoRepositorySpec,
};
use cloud_resource_controller::memory::{
    InMemoryActuator, InMemoryDependencyResolver, InMemoryNamespaceStore, InMemoryResourceStore,
};
use cloud_resource_controller::provider::ResourceActuator;
use cloud_resource_controller::store::ResourceStore;
use std::sync::Arc;

pub const NAMESPACE: &str = "team-a";
pub const PROJECT: &str = "proj-123";

pub struct Fixture<K: ManagedResource> {
    pub store: Arc<InMemoryResourceStore<K>>,
    pub actuator: Arc<InMemoryActuator>,
    pub resolver: Arc<InMemoryDependencyResolver>,
    pub namespaces: Arc<InMemoryNamespaceStore>,
    pub reconciler: Reconciler<K>,
}

impl<K: ManagedResource> Fixture<K> {
    /// Reconciler over empty backends, with `team-a` bound to `proj-123`
    pub fn new() -> Self {
        let store = Arc::new(InMemoryResourceStore::new());
        let actuator = Arc::new(InMemoryActuator::new());
        let namespaces = Arc::new(InMemoryNamespaceStore::new());
        let resolver = Arc::new(InMemoryDependencyResolver::with_namespaces(Arc::clone(&namespaces)));
        resolver.set_namespace_project(NAMESPACE, PROJECT);

        let store_handle: Arc<dyn ResourceStore<K>> = store.clone();
        let actuator_handle: Arc<dyn ResourceActuator> = actuator.clone();
        let resolver_handle: Arc<dyn DependencyResolver> = resolver.clone();
        let reconciler = Reconciler::new(
            store_handle,
            actuator_handle,
            resolver_handle,
            SchedulePolicy::default(),
        );
        Self {
            store,
            actuator,
            resolver,
            namespaces,
            reconciler,
        }
    }

    pub fn resource(&self, key: &ResourceKey) -> K {
        self.store
            .snapshot(key)
            .unwrap_or_else(|| panic!("{key} should exist"))
    }

    pub fn ready(&self, key: &ResourceKey) -> Option<Condition> {
        let resource = self.resource(key);
        let status = resource.status()?;
        find_condition(status.conditions(), READY_CONDITION).cloned()
    }

    pub fn observed_generation(&self, key: &ResourceKey) -> Option<i64> {
        self.resource(key).status().and_then(ManagedStatus::observed_generation)
    }
}

pub fn repo(name: &str, pubsub_configs: Vec<RepositoryPubsubConfig>) -> SourceRepoRepository {
    let mut repo = SourceRepoRepository::new(
        name,
        SourceRepoRepositorySpec {
            pubsub_configs,
            resource_id: None,
        },
    );
    repo.metadata.namespace = Some(NAMESPACE.to_string());
    repo
}

pub fn topic_config(topic: &str) -> RepositoryPubsubConfig {
    RepositoryPubsubConfig {
        message_format: "JSON".to_string(),
        service_account_ref: None,
        topic_ref: ResourceRef::named(topic),
    }
}
