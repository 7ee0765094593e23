//! # Provider
//!
//! Abstract actuator for the remote provider API.
//!
//! The reconciler only sees [`ResourceActuator`]: Get/Create/Update/Delete over a
//! [`DesiredState`], returning an [`ObservedState`] or a [`ProviderError`]. Errors carry a
//! structured [`ProviderErrorCode`] whenever the backend can supply one.
//!
//! Implementations:
//! - [`rest::RestActuator`]: JSON over HTTPS
//! - [`crate::memory::InMemoryActuator`]: process-local, used by tests and local clusters

pub mod rest;

pub use rest::RestActuator;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Provider-side configuration computed from a resource's spec
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    /// Kind of the managed resource (e.g. `SourceRepoRepository`)
    pub kind: String,
    /// Provider project the object lives in
    pub project: String,
    /// Region/zone for located resources
    pub location: Option<String>,
    /// Short identifier of the object within its collection
    pub resource_id: String,
    /// Parent resource name (e.g. `projects/p/locations/global`)
    pub parent: String,
    /// Collection under the parent (e.g. `spokes`)
    pub collection: String,
    /// Desired configuration fields, in provider wire naming
    pub config: Value,
}

impl DesiredState {
    /// Full provider resource name: `{parent}/{collection}/{resource_id}`
    pub fn name(&self) -> String {
        format!("{}/{}/{}", self.parent, self.collection, self.resource_id)
    }
}

/// Provider-assigned output fields copied into resource status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutput {
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub unique_id: Option<String>,
    pub state: Option<String>,
    pub url: Option<String>,
    pub size: Option<i64>,
}

impl ProviderOutput {
    /// Read output fields from a provider payload
    ///
    /// Fields are read one by one so a malformed field only loses itself. int64 values may
    /// arrive as JSON strings (`"size": "1024"`).
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            create_time: text_field(payload, "createTime"),
            update_time: text_field(payload, "updateTime"),
            unique_id: text_field(payload, "uniqueId"),
            state: text_field(payload, "state"),
            url: text_field(payload, "url"),
            size: int64_field(payload, "size"),
        }
    }
}

fn text_field(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => {
            warn!(field, value = %other, "ignoring provider output field of unexpected type");
            None
        }
    }
}

fn int64_field(payload: &Value, field: &str) -> Option<i64> {
    let parsed = match payload.get(field)? {
        Value::Null => return None,
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(field, value = %payload[field], "ignoring provider output field that is not an int64");
    }
    parsed
}

/// State of a remote object as reported by the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedState {
    /// Configuration fields as the provider reports them
    pub config: Value,
    /// Output-only fields
    pub output: ProviderOutput,
}

/// Output-only field names split off provider payloads
const OUTPUT_FIELDS: [&str; 6] = ["createTime", "updateTime", "uniqueId", "state", "url", "size"];

impl ObservedState {
    /// Split a provider payload into configuration and output-only fields
    pub fn from_payload(payload: Value) -> Self {
        let output = ProviderOutput::from_payload(&payload);
        let config = match payload {
            Value::Object(mut map) => {
                for field in OUTPUT_FIELDS {
                    map.remove(field);
                }
                Value::Object(map)
            }
            other => other,
        };
        Self { config, output }
    }
}

/// Returns true if the observed configuration differs from the desired one
///
/// Only fields present in the desired configuration are compared, so defaults the
/// provider fills in on its own are not drift. A null desired field means "unset" and
/// is ignored. Arrays of equal length are compared element by element under the same
/// rules; a length mismatch is drift.
pub fn has_drift(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => false,
        (Value::Object(want), Value::Object(have)) => want.iter().any(|(key, value)| match have.get(key) {
            Some(current) => has_drift(value, current),
            None => !value.is_null(),
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() != have.len() || want.iter().zip(have).any(|(w, h)| has_drift(w, h))
        }
        (want, have) => want != have,
    }
}

/// Operation being performed against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(value)
    }
}

/// Structured classification hint attached to a provider error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    Conflict,
    Aborted,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
    InvalidArgument,
    FailedPrecondition,
    QuotaExceeded,
    Unimplemented,
}

impl ProviderErrorCode {
    /// Map a Google-style canonical status string (`PERMISSION_DENIED`, ...)
    pub fn from_status(status: &str) -> Option<Self> {
        let code = match status {
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            "ABORTED" => Self::Aborted,
            "UNAVAILABLE" => Self::Unavailable,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "INTERNAL" => Self::Internal,
            "INVALID_ARGUMENT" | "OUT_OF_RANGE" => Self::InvalidArgument,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "UNIMPLEMENTED" => Self::Unimplemented,
            _ => return None,
        };
        Some(code)
    }

    /// Map an HTTP status code
    pub fn from_http_status(status: u16) -> Option<Self> {
        let code = match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Conflict,
            412 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            501 => Self::Unimplemented,
            502..=503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => return None,
        };
        Some(code)
    }
}

/// Error returned by a provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// Structured hint, `None` when the backend only produced a message
    pub code: Option<ProviderErrorCode>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// An error with no structured code; classification falls back to the message
    pub fn unstructured(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(ProviderErrorCode::NotFound)
    }
}

/// Remote actuator for managed objects
#[async_trait]
pub trait ResourceActuator: Send + Sync {
    /// Read the current state; a missing object is a `NotFound` error
    async fn get(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError>;

    async fn create(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError>;

    async fn update(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError>;

    async fn delete(&self, desired: &DesiredState) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_drift_ignores_provider_defaults() {
        let desired = json!({"displayName": "svc"});
        let observed = json!({"displayName": "svc", "etag": "abc"});
        assert!(!has_drift(&desired, &observed));
    }

    #[test]
    fn test_has_drift_detects_changed_field() {
        let desired = json!({"displayName": "new"});
        let observed = json!({"displayName": "old"});
        assert!(has_drift(&desired, &observed));
    }

    #[test]
    fn test_has_drift_nested_and_missing_fields() {
        let desired = json!({"telemetry": {"resourceName": "//container/x"}});
        assert!(has_drift(&desired, &json!({})));
        assert!(has_drift(&desired, &json!({"telemetry": {"resourceName": "//container/y"}})));
        assert!(!has_drift(&desired, &json!({"telemetry": {"resourceName": "//container/x"}})));
    }

    #[test]
    fn test_has_drift_null_desired_is_unset() {
        let desired = json!({"description": null});
        assert!(!has_drift(&desired, &json!({"description": "set by someone"})));
        assert!(!has_drift(&desired, &json!({})));
    }

    #[test]
    fn test_observed_state_splits_output_fields() {
        let observed = ObservedState::from_payload(json!({
            "name": "projects/p/repos/r",
            "url": "https://source.developers.google.com/p/p/r/r",
            "size": 1024,
        }));
        assert_eq!(observed.config, json!({"name": "projects/p/repos/r"}));
        assert_eq!(observed.output.size, Some(1024));
        assert!(observed.output.url.is_some());
    }

    #[test]
    fn test_observed_state_accepts_int64_as_string() {
        let observed = ObservedState::from_payload(json!({
            "name": "projects/p/repos/r",
            "url": "https://source.developers.google.com/p/p/r/r",
            "size": "1024",
        }));
        assert_eq!(observed.output.size, Some(1024));
        assert_eq!(
            observed.output.url.as_deref(),
            Some("https://source.developers.google.com/p/p/r/r")
        );
    }

    #[test]
    fn test_observed_state_keeps_fields_beside_a_malformed_one() {
        let output = ProviderOutput::from_payload(&json!({
            "uniqueId": "abc",
            "state": "ACTIVE",
            "size": {"bytes": 1},
            "createTime": 42,
        }));
        assert_eq!(output.unique_id.as_deref(), Some("abc"));
        assert_eq!(output.state.as_deref(), Some("ACTIVE"));
        assert_eq!(output.size, None);
        assert_eq!(output.create_time, None);
    }

    #[test]
    fn test_has_drift_compares_array_elements() {
        let desired = json!({
            "linkedRouterApplianceInstances": {
                "instances": [{"virtualMachine": "vm", "ipAddress": null}],
                "siteToSiteDataTransfer": true,
            }
        });
        let observed = json!({
            "linkedRouterApplianceInstances": {
                "instances": [{"virtualMachine": "vm", "zone": "us-central1-a"}],
                "siteToSiteDataTransfer": true,
            }
        });
        assert!(!has_drift(&desired, &observed));

        let moved = json!({
            "linkedRouterApplianceInstances": {
                "instances": [{"virtualMachine": "other"}],
                "siteToSiteDataTransfer": true,
            }
        });
        assert!(has_drift(&desired, &moved));

        let extra = json!({
            "linkedRouterApplianceInstances": {
                "instances": [{"virtualMachine": "vm"}, {"virtualMachine": "vm2"}],
                "siteToSiteDataTransfer": true,
            }
        });
        assert!(has_drift(&desired, &extra));
    }

    #[test]
    fn test_desired_state_name() {
        let desired = DesiredState {
            kind: "MonitoringService".to_string(),
            project: "p".to_string(),
            location: None,
            resource_id: "svc".to_string(),
            parent: "projects/p".to_string(),
            collection: "services".to_string(),
            config: json!({}),
        };
        assert_eq!(desired.name(), "projects/p/services/svc");
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ProviderErrorCode::from_status("PERMISSION_DENIED"),
            Some(ProviderErrorCode::PermissionDenied)
        );
        assert_eq!(ProviderErrorCode::from_status("SOMETHING_NEW"), None);
        assert_eq!(
            ProviderErrorCode::from_http_status(409),
            Some(ProviderErrorCode::Conflict)
        );
        assert_eq!(ProviderErrorCode::from_http_status(418), None);
    }
}
