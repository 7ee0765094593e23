//! # MonitoringService
//!
//! A monitoring service definition. Has a project reference and no other dependencies.

use super::managed::{DependencyRef, ManagedResource, ResolvedDependencies};
use super::status::{Condition, ManagedStatus};
use super::ResourceRef;
use crate::controller::reconciler::ReconcilerError;
use crate::provider::{DesiredState, ProviderOutput};
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MonitoringService",
    group = "monitoring.cnrm.cloud.google.com",
    version = "v1beta1",
    namespaced,
    status = "MonitoringServiceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringServiceSpec {
    /// Name used for UI elements listing this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Immutable. The project this resource belongs to
    pub project_ref: ResourceRef,
    /// Immutable. Name of the remote service; defaults to `metadata.name`
    #[serde(default, rename = "resourceID", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// How to query telemetry on the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<ServiceTelemetry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTelemetry {
    /// Full name of the resource that defines this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringServiceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ManagedStatus for MonitoringServiceStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }

    fn observed_generation(&self) -> Option<i64> {
        self.observed_generation
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.observed_generation = generation;
    }

    fn apply_output(&mut self, _output: &ProviderOutput) {}
}

impl ManagedResource for MonitoringService {
    type Status = MonitoringServiceStatus;

    fn project_ref(&self) -> Option<&ResourceRef> {
        Some(&self.spec.project_ref)
    }

    fn dependencies(&self) -> Vec<DependencyRef> {
        Vec::new()
    }

    fn desired_state(&self, resolved: &ResolvedDependencies) -> Result<DesiredState, ReconcilerError> {
        let parent = format!("projects/{}", resolved.project);
        let config = json!({
            "displayName": self.spec.display_name,
            "telemetry": self.spec.telemetry.as_ref().map(|t| json!({
                "resourceName": t.resource_name,
            })),
        });
        Ok(DesiredState {
            kind: Self::kind_name(),
            project: resolved.project.clone(),
            location: None,
            resource_id: self.resource_id(),
            parent,
            collection: "services".to_string(),
            config,
        })
    }

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Self::Status {
        self.status.get_or_insert_with(Default::default)
    }

    fn resource_id(&self) -> String {
        self.spec
            .resource_id
            .clone()
            .unwrap_or_else(|| self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_state_uses_resource_id_override() {
        let service = MonitoringService::new(
            "checkout",
            MonitoringServiceSpec {
                display_name: Some("Checkout".to_string()),
                project_ref: ResourceRef::external("proj-123"),
                resource_id: Some("checkout-svc".to_string()),
                telemetry: None,
            },
        );
        let desired = service
            .desired_state(&ResolvedDependencies::new("proj-123"))
            .unwrap();
        assert_eq!(desired.name(), "projects/proj-123/services/checkout-svc");
        assert_eq!(desired.config["displayName"], "Checkout");
        assert!(desired.config["telemetry"].is_null());
    }

    #[test]
    fn test_project_ref_is_exposed() {
        let service = MonitoringService::new(
            "checkout",
            MonitoringServiceSpec {
                project_ref: ResourceRef::named("my-project"),
                ..MonitoringServiceSpec::default()
            },
        );
        assert_eq!(service.project_ref(), Some(&ResourceRef::named("my-project")));
        assert!(service.dependencies().is_empty());
    }
}
