//! # Resource Status
//!
//! Condition types shared by every managed kind, and the status accessors the
//! reconciler uses to report results without knowing the concrete kind.

use crate::provider::ProviderOutput;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a condition (True, False, Unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        };
        f.write_str(value)
    }
}

/// Condition represents one named observation of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Last time the status changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Insert or update a condition, keyed by type
///
/// Insertion order is preserved. `lastTransitionTime` is stamped with `now` only when the
/// condition is new or its status changes; reason/message-only updates keep the old time.
pub fn set_condition_at(conditions: &mut Vec<Condition>, condition: Condition, now: DateTime<Utc>) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status != condition.status || existing.last_transition_time.is_none() {
                existing.last_transition_time = Some(now.to_rfc3339());
            }
            existing.status = condition.status;
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        None => conditions.push(Condition {
            last_transition_time: Some(now.to_rfc3339()),
            ..condition
        }),
    }
}

/// [`set_condition_at`] using the current time
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    set_condition_at(conditions, condition, Utc::now());
}

pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Uniform access to the status sub-record of every managed kind
pub trait ManagedStatus: Default + Clone + PartialEq + Send + Sync {
    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: Option<i64>);

    /// Copy provider-assigned fields (identifiers, timestamps, sizes) into the status
    fn apply_output(&mut self, output: &ProviderOutput);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_set_condition_inserts_with_transition_time() {
        let mut conditions = Vec::new();
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False, "UpdateFailed", "boom"),
            t(0),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, Some(t(0).to_rfc3339()));
    }

    #[test]
    fn test_set_condition_message_only_change_keeps_transition_time() {
        let mut conditions = Vec::new();
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False, "UpdateFailed", "first"),
            t(0),
        );
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False, "DependencyNotReady", "second"),
            t(30),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "DependencyNotReady");
        assert_eq!(conditions[0].message, "second");
        assert_eq!(conditions[0].last_transition_time, Some(t(0).to_rfc3339()));
    }

    #[test]
    fn test_set_condition_status_change_updates_transition_time() {
        let mut conditions = Vec::new();
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False, "UpdateFailed", "boom"),
            t(0),
        );
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::True, "UpToDate", "ok"),
            t(60),
        );
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].last_transition_time, Some(t(60).to_rfc3339()));
    }

    #[test]
    fn test_set_condition_preserves_insertion_order() {
        let mut conditions = Vec::new();
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::Unknown, "", ""),
            t(0),
        );
        set_condition_at(
            &mut conditions,
            Condition::new("Stalled", ConditionStatus::False, "", ""),
            t(1),
        );
        set_condition_at(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::True, "UpToDate", ""),
            t(2),
        );
        let types: Vec<_> = conditions.iter().map(|c| c.r#type.as_str()).collect();
        assert_eq!(types, vec!["Ready", "Stalled"]);
    }

    #[test]
    fn test_condition_status_serializes_as_string() {
        let condition = Condition::new("Ready", ConditionStatus::True, "UpToDate", "ok");
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["status"], "True");
        assert_eq!(value["type"], "Ready");
        assert!(value.get("lastTransitionTime").is_none());
    }
}
