//! # Dependency Resolution
//!
//! Resolves a resource's project and references before its desired state is computed.
//!
//! - `external` references are used verbatim and never looked up
//! - `name` references must point at an existing resource whose Ready condition is True
//! - the project comes from `spec.projectRef` when the kind has one, otherwise from the
//!   namespace's project-id annotation

use super::ReconcilerError;
use crate::constants::{PROJECT_ID_ANNOTATION, READY_CONDITION};
use crate::crd::{DependencyRef, ManagedResource, ResolvedDependencies, ResolvedReference, ResourceKey};
use crate::registry::KindRegistry;
use crate::store::{NamespaceStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject};
use kube::{Client, ResourceExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const PROJECT_FIELD: &str = "spec.projectRef";
const PROJECT_KIND: &str = "Project";

/// Looks up `name` references and namespace project bindings
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Resolve a `name` reference made from a resource in `namespace`
    async fn resolve(&self, namespace: &str, dependency: &DependencyRef) -> Result<ResolvedReference, ReconcilerError>;

    /// Project bound to `namespace` through its annotation, if any
    async fn namespace_project(&self, namespace: &str) -> Result<Option<String>, ReconcilerError>;
}

/// Resolve the project and every reference of `resource`
pub async fn resolve_all<K: ManagedResource>(
    resolver: &dyn DependencyResolver,
    resource: &K,
) -> Result<ResolvedDependencies, ReconcilerError> {
    let namespace = ResourceKey::from_resource(resource).namespace;

    let project = match resource.project_ref() {
        Some(reference) => {
            let dependency = DependencyRef::new(PROJECT_FIELD, PROJECT_KIND, reference);
            resolve_one(resolver, &namespace, &dependency)
                .await?
                .qualify(|id, _| id.to_string())
        }
        None => resolver
            .namespace_project(&namespace)
            .await?
            .ok_or_else(|| ReconcilerError::ProjectNotConfigured {
                namespace: namespace.clone(),
            })?,
    };

    let mut resolved = ResolvedDependencies::new(project);
    for dependency in resource.dependencies() {
        let reference = resolve_one(resolver, &namespace, &dependency).await?;
        resolved.references.insert(dependency.field, reference);
    }
    Ok(resolved)
}

async fn resolve_one(
    resolver: &dyn DependencyResolver,
    namespace: &str,
    dependency: &DependencyRef,
) -> Result<ResolvedReference, ReconcilerError> {
    match (&dependency.reference.external, &dependency.reference.name) {
        (Some(external), _) => Ok(ResolvedReference::External(external.clone())),
        (None, Some(_)) => resolver.resolve(namespace, dependency).await,
        (None, None) => Err(ReconcilerError::InvalidSpec(format!(
            "{} must set either name or external",
            dependency.field
        ))),
    }
}

/// Build the not-found / not-ready errors for `dependency`
pub(crate) fn reference_error(
    dependency: &DependencyRef,
    namespace: &str,
    name: &str,
    exists: bool,
) -> ReconcilerError {
    let field = dependency.field.clone();
    let kind = dependency.kind.to_string();
    let namespace = namespace.to_string();
    let name = name.to_string();
    if exists {
        ReconcilerError::ReferenceNotReady {
            field,
            kind,
            namespace,
            name,
        }
    } else {
        ReconcilerError::ReferenceNotFound {
            field,
            kind,
            namespace,
            name,
        }
    }
}

/// Resolves references against the cluster through dynamic lookups
pub struct KubeDependencyResolver {
    client: Client,
    registry: Arc<KindRegistry>,
    namespaces: Arc<dyn NamespaceStore>,
}

impl std::fmt::Debug for KubeDependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDependencyResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl KubeDependencyResolver {
    pub fn new(client: Client, registry: Arc<KindRegistry>, namespaces: Arc<dyn NamespaceStore>) -> Self {
        Self {
            client,
            registry,
            namespaces,
        }
    }
}

#[async_trait]
impl DependencyResolver for KubeDependencyResolver {
    async fn resolve(&self, namespace: &str, dependency: &DependencyRef) -> Result<ResolvedReference, ReconcilerError> {
        let namespace = dependency.reference.namespace.as_deref().unwrap_or(namespace);
        let name = dependency.reference.name.as_deref().unwrap_or_default();
        let api_resource = self.registry.api_resource(dependency.kind)?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &api_resource);

        let object = api
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, format!("{} {namespace}/{name}", dependency.kind)))?;
        let Some(object) = object else {
            return Err(reference_error(dependency, namespace, name, false));
        };
        if !is_ready(&object.data) {
            return Err(reference_error(dependency, namespace, name, true));
        }
        debug!(field = %dependency.field, kind = dependency.kind, %namespace, %name, "reference resolved");
        Ok(managed_reference(&object))
    }

    async fn namespace_project(&self, namespace: &str) -> Result<Option<String>, ReconcilerError> {
        match self.namespaces.read_annotation(namespace, PROJECT_ID_ANNOTATION).await {
            Ok(annotation) => Ok(annotation.value),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether an object's `status.conditions` carries `Ready=True`
pub(crate) fn is_ready(data: &Value) -> bool {
    data.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(READY_CONDITION)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

/// Provider identity of a referenced object: `spec.resourceID` (or its name) and location
fn managed_reference(object: &DynamicObject) -> ResolvedReference {
    let spec = object.data.get("spec");
    let field = |key: &str| {
        spec.and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    ResolvedReference::Managed {
        resource_id: field("resourceID").unwrap_or_else(|| object.name_any()),
        location: field("location").or_else(|| field("zone")).or_else(|| field("region")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MonitoringService, MonitoringServiceSpec, ResourceRef, SourceRepoRepository, SourceRepoRepositorySpec};
    use crate::memory::InMemoryDependencyResolver;
    use kube::api::ObjectMeta;
    use serde_json::json;

    fn service(project: ResourceRef) -> MonitoringService {
        let mut service = MonitoringService::new(
            "checkout",
            MonitoringServiceSpec {
                project_ref: project,
                ..MonitoringServiceSpec::default()
            },
        );
        service.metadata.namespace = Some("team-a".to_string());
        service
    }

    #[tokio::test]
    async fn test_external_project_is_used_verbatim() {
        let resolver = InMemoryDependencyResolver::new();
        let resolved = resolve_all(&resolver, &service(ResourceRef::external("proj-123")))
            .await
            .unwrap();
        assert_eq!(resolved.project, "proj-123");
    }

    #[tokio::test]
    async fn test_named_project_must_be_ready() {
        let resolver = InMemoryDependencyResolver::new();
        resolver.add("Project", "team-a", "my-project", false);
        let err = resolve_all(&resolver, &service(ResourceRef::named("my-project")))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::ReferenceNotReady { .. }));

        resolver.add("Project", "team-a", "my-project", true);
        let resolved = resolve_all(&resolver, &service(ResourceRef::named("my-project")))
            .await
            .unwrap();
        assert_eq!(resolved.project, "my-project");
    }

    #[tokio::test]
    async fn test_namespace_annotation_supplies_project() {
        let resolver = InMemoryDependencyResolver::new();
        let mut repo = SourceRepoRepository::new("app-repo", SourceRepoRepositorySpec::default());
        repo.metadata.namespace = Some("team-a".to_string());

        let err = resolve_all(&resolver, &repo).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::ProjectNotConfigured { .. }));

        resolver.set_namespace_project("team-a", "proj-123");
        let resolved = resolve_all(&resolver, &repo).await.unwrap();
        assert_eq!(resolved.project, "proj-123");
    }

    #[tokio::test]
    async fn test_reference_without_name_or_external_is_invalid() {
        let resolver = InMemoryDependencyResolver::new();
        let err = resolve_all(&resolver, &service(ResourceRef::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::InvalidSpec(_)));
    }

    #[test]
    fn test_is_ready_reads_conditions() {
        assert!(is_ready(&json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}})));
        assert!(!is_ready(&json!({"status": {"conditions": [{"type": "Ready", "status": "False"}]}})));
        assert!(!is_ready(&json!({"spec": {}})));
    }

    #[test]
    fn test_managed_reference_prefers_resource_id_and_location() {
        let object = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("router-vm".to_string()),
                ..ObjectMeta::default()
            },
            data: json!({"spec": {"resourceID": "vm-7", "zone": "us-central1-a"}}),
        };
        assert_eq!(
            managed_reference(&object),
            ResolvedReference::Managed {
                resource_id: "vm-7".to_string(),
                location: Some("us-central1-a".to_string()),
            }
        );
    }
}
