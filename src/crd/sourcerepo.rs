//! # SourceRepoRepository
//!
//! A source repository. It has no project reference: the project comes from the
//! namespace's project-id annotation.

use super::managed::{DependencyRef, ManagedResource, ResolvedDependencies};
use super::status::{Condition, ManagedStatus};
use super::ResourceRef;
use crate::controller::reconciler::ReconcilerError;
use crate::provider::{DesiredState, ProviderOutput};
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Allowed values of `pubsubConfigs[].messageFormat`
const MESSAGE_FORMATS: [&str; 2] = ["PROTOBUF", "JSON"];

/// SourceRepoRepository Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: sourcerepo.cnrm.cloud.google.com/v1beta1
/// kind: SourceRepoRepository
/// metadata:
///   name: app-repo
///   namespace: team-a
/// spec:
///   pubsubConfigs:
///     - messageFormat: JSON
///       topicRef:
///         name: repo-events
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SourceRepoRepository",
    group = "sourcerepo.cnrm.cloud.google.com",
    version = "v1beta1",
    namespaced,
    status = "SourceRepoRepositoryStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SourceRepoRepositorySpec {
    /// How this repository publishes changes through Pub/Sub, one entry per topic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pubsub_configs: Vec<RepositoryPubsubConfig>,
    /// Immutable. Name of the remote repository; defaults to `metadata.name`
    #[serde(default, rename = "resourceID", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPubsubConfig {
    /// Format of published messages: PROTOBUF or JSON
    pub message_format: String,
    /// Service account used for publishing; the compute default account when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_ref: Option<ResourceRef>,
    pub topic_ref: ResourceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRepoRepositoryStatus {
    /// Latest available observations of the resource's state
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation most recently reconciled successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Disk usage of the repository, in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Clone URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ManagedStatus for SourceRepoRepositoryStatus {
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
        self.size = output.size;
        self.url.clone_from(&output.url);
    }
}

fn topic_field(index: usize) -> String {
    format!("spec.pubsubConfigs[{index}].topicRef")
}

fn service_account_field(index: usize) -> String {
    format!("spec.pubsubConfigs[{index}].serviceAccountRef")
}

impl ManagedResource for SourceRepoRepository {
    type Status = SourceRepoRepositoryStatus;

    fn project_ref(&self) -> Option<&ResourceRef> {
        None
    }

    fn dependencies(&self) -> Vec<DependencyRef> {
        let mut deps = Vec::new();
        for (index, config) in self.spec.pubsub_configs.iter().enumerate() {
            deps.push(DependencyRef::new(topic_field(index), "PubSubTopic", &config.topic_ref));
            if let Some(account) = &config.service_account_ref {
                deps.push(DependencyRef::new(
                    service_account_field(index),
                    "IAMServiceAccount",
                    account,
                ));
            }
        }
        deps
    }

    fn desired_state(&self, resolved: &ResolvedDependencies) -> Result<DesiredState, ReconcilerError> {
        let project = resolved.project.as_str();
        let resource_id = self.resource_id();

        let mut pubsub = Map::new();
        for (index, config) in self.spec.pubsub_configs.iter().enumerate() {
            if !MESSAGE_FORMATS.contains(&config.message_format.as_str()) {
                return Err(ReconcilerError::InvalidSpec(format!(
                    "spec.pubsubConfigs[{index}].messageFormat must be one of {MESSAGE_FORMATS:?}, got '{}'",
                    config.message_format
                )));
            }
            let topic = resolved
                .get(&topic_field(index))?
                .qualify(|id, _| format!("projects/{project}/topics/{id}"));
            let mut entry = json!({
                "topic": topic,
                "messageFormat": config.message_format,
            });
            if config.service_account_ref.is_some() {
                let email = resolved
                    .get(&service_account_field(index))?
                    .qualify(|id, _| format!("{id}@{project}.iam.gserviceaccount.com"));
                entry["serviceAccountEmail"] = Value::String(email);
            }
            pubsub.insert(topic, entry);
        }

        let parent = format!("projects/{project}");
        let mut config = json!({ "name": format!("{parent}/repos/{resource_id}") });
        if !pubsub.is_empty() {
            config["pubsubConfigs"] = Value::Object(pubsub);
        }

        Ok(DesiredState {
            kind: Self::kind_name(),
            project: project.to_string(),
            location: None,
            resource_id,
            parent,
            collection: "repos".to_string(),
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
    use crate::crd::ResolvedReference;

    fn repo(configs: Vec<RepositoryPubsubConfig>) -> SourceRepoRepository {
        let mut repo = SourceRepoRepository::new(
            "app-repo",
            SourceRepoRepositorySpec {
                pubsub_configs: configs,
                resource_id: None,
            },
        );
        repo.metadata.namespace = Some("team-a".to_string());
        repo
    }

    #[test]
    fn test_dependencies_lists_topics_and_service_accounts() {
        let repo = repo(vec![RepositoryPubsubConfig {
            message_format: "JSON".to_string(),
            service_account_ref: Some(ResourceRef::named("publisher")),
            topic_ref: ResourceRef::named("events"),
        }]);
        let deps = repo.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].kind, "PubSubTopic");
        assert_eq!(deps[1].field, "spec.pubsubConfigs[0].serviceAccountRef");
    }

    #[test]
    fn test_desired_state_defaults_resource_id_to_name() {
        let repo = repo(Vec::new());
        let desired = repo.desired_state(&ResolvedDependencies::new("proj-123")).unwrap();
        assert_eq!(desired.resource_id, "app-repo");
        assert_eq!(desired.name(), "projects/proj-123/repos/app-repo");
        assert_eq!(desired.config["name"], "projects/proj-123/repos/app-repo");
        assert!(desired.config.get("pubsubConfigs").is_none());
    }

    #[test]
    fn test_desired_state_keys_pubsub_configs_by_topic() {
        let repo = repo(vec![RepositoryPubsubConfig {
            message_format: "PROTOBUF".to_string(),
            service_account_ref: Some(ResourceRef::external("ci@other.iam.gserviceaccount.com")),
            topic_ref: ResourceRef::named("events"),
        }]);
        let resolved = ResolvedDependencies::new("proj-123")
            .with(
                "spec.pubsubConfigs[0].topicRef",
                ResolvedReference::Managed {
                    resource_id: "events".to_string(),
                    location: None,
                },
            )
            .with(
                "spec.pubsubConfigs[0].serviceAccountRef",
                ResolvedReference::External("ci@other.iam.gserviceaccount.com".to_string()),
            );
        let desired = repo.desired_state(&resolved).unwrap();
        let entry = &desired.config["pubsubConfigs"]["projects/proj-123/topics/events"];
        assert_eq!(entry["messageFormat"], "PROTOBUF");
        assert_eq!(entry["serviceAccountEmail"], "ci@other.iam.gserviceaccount.com");
    }

    #[test]
    fn test_invalid_message_format_is_rejected() {
        let repo = repo(vec![RepositoryPubsubConfig {
            message_format: "XML".to_string(),
            service_account_ref: None,
            topic_ref: ResourceRef::named("events"),
        }]);
        let err = repo
            .desired_state(&ResolvedDependencies::new("proj-123"))
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::InvalidSpec(_)));
    }

    #[test]
    fn test_apply_output_copies_url_and_size() {
        let mut status = SourceRepoRepositoryStatus::default();
        status.apply_output(&ProviderOutput {
            url: Some("https://source.example/r".to_string()),
            size: Some(2048),
            ..ProviderOutput::default()
        });
        assert_eq!(status.size, Some(2048));
        assert_eq!(status.url.as_deref(), Some("https://source.example/r"));
    }
}
