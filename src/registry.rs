//! # Kind Registry
//!
//! Explicit table of every kind the controller knows about: the kinds it reconciles and the
//! kinds it only reads when resolving references. Built once at startup and shared.

use crate::controller::reconciler::ReconcilerError;
use crate::crd::{MonitoringService, NetworkConnectivitySpoke, SourceRepoRepository};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::{ApiResource, GroupVersionKind};
use kube::{CustomResourceExt, Resource};
use std::collections::BTreeMap;

/// Where a kind is served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    pub group: String,
    pub version: String,
    pub plural: String,
    /// Reconciled by this controller (as opposed to only referenced)
    pub managed: bool,
}

/// Registry of known kinds
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<String, KindInfo>,
}

/// Kinds referenced by the managed kinds: (kind, group, plural)
const REFERENCED_KINDS: &[(&str, &str, &str)] = &[
    ("Project", "resourcemanager.cnrm.cloud.google.com", "projects"),
    ("PubSubTopic", "pubsub.cnrm.cloud.google.com", "pubsubtopics"),
    ("IAMServiceAccount", "iam.cnrm.cloud.google.com", "iamserviceaccounts"),
    ("NetworkConnectivityHub", "networkconnectivity.cnrm.cloud.google.com", "networkconnectivityhubs"),
    ("ComputeVPNTunnel", "compute.cnrm.cloud.google.com", "computevpntunnels"),
    (
        "ComputeInterconnectAttachment",
        "compute.cnrm.cloud.google.com",
        "computeinterconnectattachments",
    ),
    ("ComputeInstance", "compute.cnrm.cloud.google.com", "computeinstances"),
];

const REFERENCED_VERSION: &str = "v1beta1";

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three managed kinds and every kind they reference
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register_managed::<SourceRepoRepository>();
        registry.register_managed::<MonitoringService>();
        registry.register_managed::<NetworkConnectivitySpoke>();
        for (kind, group, plural) in REFERENCED_KINDS {
            registry.register(
                kind,
                KindInfo {
                    group: (*group).to_string(),
                    version: REFERENCED_VERSION.to_string(),
                    plural: (*plural).to_string(),
                    managed: false,
                },
            );
        }
        registry
    }

    pub fn register(&mut self, kind: &str, info: KindInfo) {
        self.kinds.insert(kind.to_string(), info);
    }

    pub fn register_managed<K: Resource<DynamicType = ()>>(&mut self) {
        self.register(
            &K::kind(&()),
            KindInfo {
                group: K::group(&()).into_owned(),
                version: K::version(&()).into_owned(),
                plural: K::plural(&()).into_owned(),
                managed: true,
            },
        );
    }

    pub fn get(&self, kind: &str) -> Option<&KindInfo> {
        self.kinds.get(kind)
    }

    /// Names of the kinds reconciled by this controller
    pub fn managed_kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds
            .iter()
            .filter(|(_, info)| info.managed)
            .map(|(kind, _)| kind.as_str())
    }

    /// Dynamic API resource for `kind`, for untyped lookups
    pub fn api_resource(&self, kind: &str) -> Result<ApiResource, ReconcilerError> {
        let info = self
            .get(kind)
            .ok_or_else(|| ReconcilerError::InvalidSpec(format!("unknown kind {kind}")))?;
        let gvk = GroupVersionKind::gvk(&info.group, &info.version, kind);
        Ok(ApiResource::from_gvk_with_plural(&gvk, &info.plural))
    }

    /// CustomResourceDefinitions of the managed kinds
    pub fn crds() -> Vec<CustomResourceDefinition> {
        vec![
            SourceRepoRepository::crd(),
            MonitoringService::crd(),
            NetworkConnectivitySpoke::crd(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contains_managed_and_referenced_kinds() {
        let registry = KindRegistry::with_builtin_kinds();
        let managed: Vec<_> = registry.managed_kinds().collect();
        assert_eq!(
            managed,
            vec!["MonitoringService", "NetworkConnectivitySpoke", "SourceRepoRepository"]
        );
        let hub = registry.get("NetworkConnectivityHub").unwrap();
        assert!(!hub.managed);
        assert_eq!(hub.plural, "networkconnectivityhubs");
    }

    #[test]
    fn test_api_resource_for_referenced_kind() {
        let registry = KindRegistry::with_builtin_kinds();
        let resource = registry.api_resource("PubSubTopic").unwrap();
        assert_eq!(resource.api_version, "pubsub.cnrm.cloud.google.com/v1beta1");
        assert_eq!(resource.plural, "pubsubtopics");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let registry = KindRegistry::with_builtin_kinds();
        assert!(matches!(
            registry.api_resource("StorageBucket"),
            Err(ReconcilerError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_crds_are_namespaced_v1beta1() {
        for crd in KindRegistry::crds() {
            assert_eq!(crd.spec.scope, "Namespaced");
            assert_eq!(crd.spec.versions[0].name, "v1beta1");
        }
    }

    #[test]
    fn test_managed_kind_plural() {
        let registry = KindRegistry::with_builtin_kinds();
        let spoke = registry.get("NetworkConnectivitySpoke").unwrap();
        assert_eq!(spoke.plural, "networkconnectivityspokes");
        assert_eq!(spoke.group, "networkconnectivity.cnrm.cloud.google.com");
    }
}
