//! Reference resolution against registered objects

use super::lock;
use super::InMemoryNamespaceStore;
use crate::constants::PROJECT_ID_ANNOTATION;
use crate::controller::reconciler::{reference_error, DependencyResolver, ReconcilerError};
use crate::crd::{DependencyRef, ResolvedReference};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct RegisteredObject {
    ready: bool,
    resource_id: String,
    location: Option<String>,
}

/// Resolver over objects registered by (kind, namespace, name)
#[derive(Debug)]
pub struct InMemoryDependencyResolver {
    objects: Mutex<HashMap<(String, String, String), RegisteredObject>>,
    namespaces: Arc<InMemoryNamespaceStore>,
}

impl Default for InMemoryDependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDependencyResolver {
    pub fn new() -> Self {
        Self::with_namespaces(Arc::new(InMemoryNamespaceStore::new()))
    }

    /// Resolver reading namespace project bindings from `namespaces`
    pub fn with_namespaces(namespaces: Arc<InMemoryNamespaceStore>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            namespaces,
        }
    }

    /// Register an object whose resource ID is its name
    pub fn add(&self, kind: &str, namespace: &str, name: &str, ready: bool) {
        self.add_with_location(kind, namespace, name, name, None, ready);
    }

    pub fn add_with_location(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        resource_id: &str,
        location: Option<&str>,
        ready: bool,
    ) {
        lock(&self.objects).insert(
            (kind.to_string(), namespace.to_string(), name.to_string()),
            RegisteredObject {
                ready,
                resource_id: resource_id.to_string(),
                location: location.map(str::to_string),
            },
        );
    }

    pub fn set_namespace_project(&self, namespace: &str, project: &str) {
        self.namespaces
            .set_annotation(namespace, PROJECT_ID_ANNOTATION, project);
    }
}

#[async_trait]
impl DependencyResolver for InMemoryDependencyResolver {
    async fn resolve(&self, namespace: &str, dependency: &DependencyRef) -> Result<ResolvedReference, ReconcilerError> {
        let namespace = dependency.reference.namespace.as_deref().unwrap_or(namespace);
        let name = dependency.reference.name.as_deref().unwrap_or_default();
        let object = lock(&self.objects)
            .get(&(dependency.kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned();
        match object {
            None => Err(reference_error(dependency, namespace, name, false)),
            Some(object) if !object.ready => {
                Err(reference_error(dependency, namespace, name, true))
            }
            Some(object) => Ok(ResolvedReference::Managed {
                resource_id: object.resource_id,
                location: object.location,
            }),
        }
    }

    async fn namespace_project(&self, namespace: &str) -> Result<Option<String>, ReconcilerError> {
        Ok(self.namespaces.annotation(namespace, PROJECT_ID_ANNOTATION))
    }
}
