//! # Custom Resource Definitions
//!
//! CRD types for the managed resource kinds, plus the reference and status types they share.
//!
//! Every kind has the same shape: a `Spec` holding desired configuration and references to the
//! resources it depends on, and a `Status` holding conditions, `observedGeneration` and the
//! provider-assigned fields for that kind.

mod managed;
mod monitoring;
mod networkconnectivity;
mod sourcerepo;
mod status;

pub use managed::{DependencyRef, ManagedResource, ResolvedDependencies, ResolvedReference};
pub use monitoring::{MonitoringService, MonitoringServiceSpec, MonitoringServiceStatus, ServiceTelemetry};
pub use networkconnectivity::{
    NetworkConnectivitySpoke, NetworkConnectivitySpokeSpec, NetworkConnectivitySpokeStatus,
    SpokeInstances, SpokeLinkedInterconnectAttachments, SpokeLinkedRouterApplianceInstances,
    SpokeLinkedVpnTunnels,
};
pub use sourcerepo::{
    RepositoryPubsubConfig, SourceRepoRepository, SourceRepoRepositorySpec,
    SourceRepoRepositoryStatus,
};
pub use status::{
    find_condition, set_condition, set_condition_at, Condition, ConditionStatus, ManagedStatus,
};

use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to another resource
///
/// Either `external` (a provider identifier used verbatim) or `name` (plus optional
/// `namespace`, defaulting to the referencing resource's namespace) must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// Provider identifier of a resource not managed by this controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
    /// Name of the referenced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace of the referenced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn external(value: impl Into<String>) -> Self {
        Self {
            external: Some(value.into()),
            ..Self::default()
        }
    }
}

/// Identity of one managed resource: the input to a reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: Resource>(resource: &K) -> Self {
        Self {
            namespace: resource.namespace().unwrap_or_else(|| "default".to_string()),
            name: resource.name_any(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
