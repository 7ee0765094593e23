//! Simulated provider

use super::lock;
use crate::provider::{
    DesiredState, ObservedState, ProviderError, ProviderErrorCode, ProviderOperation, ResourceActuator,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Process-local provider keyed by full resource name
///
/// Created objects get provider-assigned output fields the way the real API fills them in:
/// timestamps and a unique id for every object, `state` for spokes, `url`/`size` for repos.
#[derive(Debug, Default)]
pub struct InMemoryActuator {
    objects: Mutex<BTreeMap<String, Value>>,
    failures: Mutex<HashMap<ProviderOperation, VecDeque<ProviderError>>>,
    calls: Mutex<Vec<(ProviderOperation, String)>>,
    next_id: AtomicU64,
}

impl InMemoryActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `operation` fail with `error`
    pub fn fail_next(&self, operation: ProviderOperation, error: ProviderError, times: usize) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .extend(std::iter::repeat_n(error, times));
    }

    /// Seed a remote object, e.g. one created out of band
    pub fn insert_object(&self, name: impl Into<String>, payload: Value) {
        lock(&self.objects).insert(name.into(), payload);
    }

    pub fn object(&self, name: &str) -> Option<Value> {
        lock(&self.objects).get(name).cloned()
    }

    pub fn calls(&self) -> Vec<(ProviderOperation, String)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, operation: ProviderOperation) -> usize {
        lock(&self.calls).iter().filter(|(op, _)| *op == operation).count()
    }

    fn begin(&self, operation: ProviderOperation, desired: &DesiredState) -> Result<String, ProviderError> {
        let name = desired.name();
        debug!(%operation, %name, "in-memory provider call");
        lock(&self.calls).push((operation, name.clone()));
        if let Some(error) = lock(&self.failures).get_mut(&operation).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(name)
    }

    fn output_fields(&self, desired: &DesiredState) -> Map<String, Value> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut output = Map::new();
        output.insert("createTime".to_string(), Value::String(now.clone()));
        output.insert("updateTime".to_string(), Value::String(now));
        output.insert("uniqueId".to_string(), Value::String(format!("{id:016x}")));
        match desired.collection.as_str() {
            "spokes" => {
                output.insert("state".to_string(), Value::String("ACTIVE".to_string()));
            }
            "repos" => {
                output.insert(
                    "url".to_string(),
                    Value::String(format!(
                        "https://source.developers.google.com/p/{}/r/{}",
                        desired.project, desired.resource_id
                    )),
                );
                output.insert("size".to_string(), Value::from(0));
            }
            _ => {}
        }
        output
    }
}

fn not_found(name: &str) -> ProviderError {
    ProviderError::new(ProviderErrorCode::NotFound, format!("Error 404: {name} not found"))
}

/// Copy non-null desired fields over `target`
fn merge_config(target: &mut Map<String, Value>, config: &Value) {
    if let Value::Object(fields) = config {
        for (key, value) in fields {
            if !value.is_null() {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl ResourceActuator for InMemoryActuator {
    async fn get(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        let name = self.begin(ProviderOperation::Get, desired)?;
        let payload = self.object(&name).ok_or_else(|| not_found(&name))?;
        Ok(ObservedState::from_payload(payload))
    }

    async fn create(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        let name = self.begin(ProviderOperation::Create, desired)?;
        let mut objects = lock(&self.objects);
        if objects.contains_key(&name) {
            return Err(ProviderError::new(
                ProviderErrorCode::AlreadyExists,
                format!("Error 409: {name} already exists"),
            ));
        }
        let mut payload = self.output_fields(desired);
        merge_config(&mut payload, &desired.config);
        let payload = Value::Object(payload);
        objects.insert(name, payload.clone());
        Ok(ObservedState::from_payload(payload))
    }

    async fn update(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        let name = self.begin(ProviderOperation::Update, desired)?;
        let mut objects = lock(&self.objects);
        let Some(Value::Object(payload)) = objects.get_mut(&name) else {
            return Err(not_found(&name));
        };
        merge_config(payload, &desired.config);
        payload.insert(
            "updateTime".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        Ok(ObservedState::from_payload(Value::Object(payload.clone())))
    }

    async fn delete(&self, desired: &DesiredState) -> Result<(), ProviderError> {
        let name = self.begin(ProviderOperation::Delete, desired)?;
        lock(&self.objects)
            .remove(&name)
            .map(|_| ())
            .ok_or_else(|| not_found(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired(config: Value) -> DesiredState {
        DesiredState {
            kind: "SourceRepoRepository".to_string(),
            project: "proj-123".to_string(),
            location: None,
            resource_id: "app-repo".to_string(),
            parent: "projects/proj-123".to_string(),
            collection: "repos".to_string(),
            config,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_output_fields() {
        let actuator = InMemoryActuator::new();
        let observed = actuator
            .create(&desired(json!({"name": "projects/proj-123/repos/app-repo"})))
            .await
            .unwrap();
        assert_eq!(
            observed.output.url.as_deref(),
            Some("https://source.developers.google.com/p/proj-123/r/app-repo")
        );
        assert_eq!(observed.output.size, Some(0));
        assert!(observed.output.unique_id.is_some());
        assert_eq!(observed.config, json!({"name": "projects/proj-123/repos/app-repo"}));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let actuator = InMemoryActuator::new();
        let err = actuator.get(&desired(json!({}))).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let actuator = InMemoryActuator::new();
        actuator.fail_next(
            ProviderOperation::Get,
            ProviderError::new(ProviderErrorCode::PermissionDenied, "denied"),
            2,
        );
        for _ in 0..2 {
            let err = actuator.get(&desired(json!({}))).await.unwrap_err();
            assert_eq!(err.code, Some(ProviderErrorCode::PermissionDenied));
        }
        assert!(actuator.get(&desired(json!({}))).await.unwrap_err().is_not_found());
        assert_eq!(actuator.call_count(ProviderOperation::Get), 3);
    }

    #[tokio::test]
    async fn test_update_merges_non_null_fields() {
        let actuator = InMemoryActuator::new();
        actuator
            .create(&desired(json!({"displayName": "old", "description": "keep"})))
            .await
            .unwrap();
        let observed = actuator
            .update(&desired(json!({"displayName": "new", "description": null})))
            .await
            .unwrap();
        assert_eq!(observed.config["displayName"], "new");
        assert_eq!(observed.config["description"], "keep");
    }
}
