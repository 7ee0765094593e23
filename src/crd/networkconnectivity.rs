//! # NetworkConnectivitySpoke
//!
//! A spoke attached to a connectivity hub. Depends on its project and hub, and on whichever
//! linked resources (VPN tunnels, interconnect attachments or router appliance VMs) it carries.

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
    kind = "NetworkConnectivitySpoke",
    group = "networkconnectivity.cnrm.cloud.google.com",
    version = "v1beta1",
    namespaced,
    status = "NetworkConnectivitySpokeStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnectivitySpokeSpec {
    /// Optional description of the spoke
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Immutable. Hub this spoke attaches to
    pub hub_ref: ResourceRef,
    /// Immutable. VLAN attachments that all advertise the same prefixes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_interconnect_attachments: Option<SpokeLinkedInterconnectAttachments>,
    /// Immutable. Router appliance instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_router_appliance_instances: Option<SpokeLinkedRouterApplianceInstances>,
    /// Immutable. VPN tunnels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_vpn_tunnels: Option<SpokeLinkedVpnTunnels>,
    /// Immutable. Location of the spoke
    pub location: String,
    /// Immutable. The project this resource belongs to
    pub project_ref: ResourceRef,
    /// Immutable. Name of the remote spoke; defaults to `metadata.name`
    #[serde(default, rename = "resourceID", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpokeLinkedInterconnectAttachments {
    pub site_to_site_data_transfer: bool,
    pub uris: Vec<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpokeLinkedRouterApplianceInstances {
    pub instances: Vec<SpokeInstances>,
    pub site_to_site_data_transfer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpokeInstances {
    /// IP address on the VM to use for peering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_ref: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpokeLinkedVpnTunnels {
    pub site_to_site_data_transfer: bool,
    pub uris: Vec<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnectivitySpokeStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Time the spoke was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Lifecycle state: STATE_UNSPECIFIED, CREATING, ACTIVE, DELETING
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Provider-generated UUID, different for every incarnation of the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Time the spoke was last updated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl ManagedStatus for NetworkConnectivitySpokeStatus {
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

    fn apply_output(&mut self, output: &ProviderOutput) {
        self.create_time.clone_from(&output.create_time);
        self.update_time.clone_from(&output.update_time);
        self.unique_id.clone_from(&output.unique_id);
        self.state.clone_from(&output.state);
    }
}

const HUB_FIELD: &str = "spec.hubRef";

fn vpn_field(index: usize) -> String {
    format!("spec.linkedVpnTunnels.uris[{index}]")
}

fn interconnect_field(index: usize) -> String {
    format!("spec.linkedInterconnectAttachments.uris[{index}]")
}

fn instance_field(index: usize) -> String {
    format!("spec.linkedRouterApplianceInstances.instances[{index}].virtualMachineRef")
}

impl NetworkConnectivitySpoke {
    fn validate(&self) -> Result<(), ReconcilerError> {
        if self.spec.location.trim().is_empty() {
            return Err(ReconcilerError::InvalidSpec(
                "spec.location must not be empty".to_string(),
            ));
        }
        let linked = [
            self.spec.linked_vpn_tunnels.is_some(),
            self.spec.linked_interconnect_attachments.is_some(),
            self.spec.linked_router_appliance_instances.is_some(),
        ];
        if linked.iter().filter(|set| **set).count() > 1 {
            return Err(ReconcilerError::InvalidSpec(
                "only one of linkedVpnTunnels, linkedInterconnectAttachments and linkedRouterApplianceInstances may be set".to_string(),
            ));
        }
        Ok(())
    }
}

impl ManagedResource for NetworkConnectivitySpoke {
    type Status = NetworkConnectivitySpokeStatus;

    fn project_ref(&self) -> Option<&ResourceRef> {
        Some(&self.spec.project_ref)
    }

    fn dependencies(&self) -> Vec<DependencyRef> {
        let mut deps = vec![DependencyRef::new(HUB_FIELD, "NetworkConnectivityHub", &self.spec.hub_ref)];
        if let Some(tunnels) = &self.spec.linked_vpn_tunnels {
            deps.extend(
                tunnels
                    .uris
                    .iter()
                    .enumerate()
                    .map(|(i, uri)| DependencyRef::new(vpn_field(i), "ComputeVPNTunnel", uri)),
            );
        }
        if let Some(attachments) = &self.spec.linked_interconnect_attachments {
            deps.extend(attachments.uris.iter().enumerate().map(|(i, uri)| {
                DependencyRef::new(interconnect_field(i), "ComputeInterconnectAttachment", uri)
            }));
        }
        if let Some(appliances) = &self.spec.linked_router_appliance_instances {
            deps.extend(appliances.instances.iter().enumerate().filter_map(|(i, instance)| {
                instance
                    .virtual_machine_ref
                    .as_ref()
                    .map(|vm| DependencyRef::new(instance_field(i), "ComputeInstance", vm))
            }));
        }
        deps
    }

    fn desired_state(&self, resolved: &ResolvedDependencies) -> Result<DesiredState, ReconcilerError> {
        self.validate()?;
        let project = resolved.project.as_str();
        let location = self.spec.location.as_str();

        let hub = resolved
            .get(HUB_FIELD)?
            .qualify(|id, _| format!("projects/{project}/locations/global/hubs/{id}"));
        let mut config = json!({
            "description": self.spec.description,
            "hub": hub,
        });

        if let Some(tunnels) = &self.spec.linked_vpn_tunnels {
            let uris = (0..tunnels.uris.len())
                .map(|i| {
                    resolved.get(&vpn_field(i)).map(|r| {
                        r.qualify(|id, loc| {
                            format!("projects/{project}/regions/{}/vpnTunnels/{id}", loc.unwrap_or(location))
                        })
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            config["linkedVpnTunnels"] = json!({
                "uris": uris,
                "siteToSiteDataTransfer": tunnels.site_to_site_data_transfer,
            });
        }

        if let Some(attachments) = &self.spec.linked_interconnect_attachments {
            let uris = (0..attachments.uris.len())
                .map(|i| {
                    resolved.get(&interconnect_field(i)).map(|r| {
                        r.qualify(|id, loc| {
                            format!(
                                "projects/{project}/regions/{}/interconnectAttachments/{id}",
                                loc.unwrap_or(location)
                            )
                        })
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            config["linkedInterconnectAttachments"] = json!({
                "uris": uris,
                "siteToSiteDataTransfer": attachments.site_to_site_data_transfer,
            });
        }

        if let Some(appliances) = &self.spec.linked_router_appliance_instances {
            let mut instances = Vec::with_capacity(appliances.instances.len());
            for (i, instance) in appliances.instances.iter().enumerate() {
                let vm = match &instance.virtual_machine_ref {
                    Some(_) => Some(resolved.get(&instance_field(i))?.qualify(|id, zone| {
                        format!("projects/{project}/zones/{}/instances/{id}", zone.unwrap_or(location))
                    })),
                    None => None,
                };
                instances.push(json!({
                    "virtualMachine": vm,
                    "ipAddress": instance.ip_address,
                }));
            }
            config["linkedRouterApplianceInstances"] = json!({
                "instances": instances,
                "siteToSiteDataTransfer": appliances.site_to_site_data_transfer,
            });
        }

        Ok(DesiredState {
            kind: Self::kind_name(),
            project: project.to_string(),
            location: Some(location.to_string()),
            resource_id: self.resource_id(),
            parent: format!("projects/{project}/locations/{location}"),
            collection: "spokes".to_string(),
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
