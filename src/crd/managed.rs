//! # Managed Resource Contract
//!
//! The per-kind hooks the reconciler needs: which references to resolve, how to turn the
//! spec plus resolved references into a [`DesiredState`], and where the status lives.

use super::status::ManagedStatus;
use super::ResourceRef;
use crate::controller::reconciler::ReconcilerError;
use crate::provider::DesiredState;
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A reference the reconciler must resolve before computing desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    /// Spec path of the reference, e.g. `spec.hubRef`
    pub field: String,
    /// Kind of the referenced resource
    pub kind: &'static str,
    pub reference: ResourceRef,
}

impl DependencyRef {
    pub fn new(field: impl Into<String>, kind: &'static str, reference: &ResourceRef) -> Self {
        Self {
            field: field.into(),
            kind,
            reference: reference.clone(),
        }
    }
}

/// Result of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    /// `external` value, used verbatim
    External(String),
    /// A managed resource: its provider resource ID and, when it has one, its location
    Managed {
        resource_id: String,
        location: Option<String>,
    },
}

impl ResolvedReference {
    /// Provider identifier for this reference
    ///
    /// External values are returned as-is; managed ones are formatted by `qualify`, which
    /// receives the resource ID and optional location.
    pub fn qualify(&self, qualify: impl FnOnce(&str, Option<&str>) -> String) -> String {
        match self {
            Self::External(value) => value.clone(),
            Self::Managed {
                resource_id,
                location,
            } => qualify(resource_id, location.as_deref()),
        }
    }
}

/// All references of one resource, resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependencies {
    /// Provider project the resource belongs to
    pub project: String,
    /// Resolved references keyed by [`DependencyRef::field`]
    pub references: BTreeMap<String, ResolvedReference>,
}

impl ResolvedDependencies {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            references: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, reference: ResolvedReference) -> Self {
        self.references.insert(field.into(), reference);
        self
    }

    pub fn get(&self, field: &str) -> Result<&ResolvedReference, ReconcilerError> {
        self.references
            .get(field)
            .ok_or_else(|| ReconcilerError::InvalidSpec(format!("reference {field} was not resolved")))
    }
}

/// A resource kind reconciled by this controller
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: ManagedStatus + Debug + Serialize + DeserializeOwned;

    /// Project reference, for kinds that carry one; the namespace's project annotation is
    /// used otherwise
    fn project_ref(&self) -> Option<&ResourceRef>;

    /// References other than the project that must resolve before acting
    fn dependencies(&self) -> Vec<DependencyRef>;

    fn desired_state(&self, resolved: &ResolvedDependencies) -> Result<DesiredState, ReconcilerError>;

    fn status(&self) -> Option<&Self::Status>;

    fn status_mut(&mut self) -> &mut Self::Status;

    /// Name of the remote object: `spec.resourceID`, defaulting to `metadata.name`
    fn resource_id(&self) -> String;

    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }

    fn generation(&self) -> Option<i64> {
        self.meta().generation
    }

    fn is_being_deleted(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_external_is_verbatim() {
        let resolved = ResolvedReference::External("projects/x/topics/t".to_string());
        let value = resolved.qualify(|id, _| format!("projects/p/topics/{id}"));
        assert_eq!(value, "projects/x/topics/t");
    }

    #[test]
    fn test_qualify_managed_uses_formatter() {
        let resolved = ResolvedReference::Managed {
            resource_id: "vm-1".to_string(),
            location: Some("us-central1-a".to_string()),
        };
        let value = resolved.qualify(|id, loc| {
            format!("projects/p/zones/{}/instances/{id}", loc.unwrap_or("unknown"))
        });
        assert_eq!(value, "projects/p/zones/us-central1-a/instances/vm-1");
    }

    #[test]
    fn test_missing_resolved_reference_is_invalid_spec() {
        let resolved = ResolvedDependencies::new("p");
        let err = resolved.get("spec.hubRef").unwrap_err();
        assert!(matches!(err, ReconcilerError::InvalidSpec(_)));
    }
}
