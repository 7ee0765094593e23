//! # Reconciler Errors

use crate::constants::PROJECT_ID_ANNOTATION;
use crate::controller::classifier::ErrorClass;
use crate::controller::schedule::ReconcileSchedule;
use crate::provider::{ProviderError, ProviderOperation};
use crate::store::StoreError;
use thiserror::Error;

/// Error produced while reconciling one resource
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A referenced resource does not exist
    #[error("reference {field} could not be resolved: {kind} {namespace}/{name} not found")]
    ReferenceNotFound {
        field: String,
        kind: String,
        namespace: String,
        name: String,
    },
    /// A referenced resource exists but has not reached Ready
    #[error("reference {field} is not ready: {kind} {namespace}/{name}")]
    ReferenceNotReady {
        field: String,
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("no project configured: resource has no projectRef and namespace {namespace} has no {annotation} annotation", annotation = PROJECT_ID_ANNOTATION)]
    ProjectNotConfigured { namespace: String },
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("provider {operation} failed: {source}")]
    Provider {
        operation: ProviderOperation,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    pub fn provider(operation: ProviderOperation, source: ProviderError) -> Self {
        Self::Provider { operation, source }
    }

    /// `reason` written to the Ready condition when this error ends a reconcile
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound { .. } | Self::ProjectNotConfigured { .. } => "DependencyNotFound",
            Self::ReferenceNotReady { .. } => "DependencyNotReady",
            Self::InvalidSpec(_) => "InvalidSpec",
            Self::Provider {
                operation: ProviderOperation::Delete,
                ..
            } => "DeleteFailed",
            Self::Provider { .. } | Self::Store(_) | Self::Serialization(_) => "UpdateFailed",
        }
    }

    /// Whether this error means a referenced resource could not be used
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(
            self,
            Self::ReferenceNotFound { .. } | Self::ReferenceNotReady { .. } | Self::ProjectNotConfigured { .. }
        )
    }
}

/// A failed reconcile: the error together with the schedule computed for it
///
/// The schedule is what the hosting substrate should do next; `{false, 5s}` for a
/// transient failure still inside its retry budget, `{false, 0}` once the error is surfaced.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ReconcileFailure {
    pub schedule: ReconcileSchedule,
    pub class: ErrorClass,
    pub source: ReconcilerError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorCode;

    #[test]
    fn test_reason_by_error_kind() {
        let not_found = ReconcilerError::ReferenceNotFound {
            field: "spec.hubRef".to_string(),
            kind: "NetworkConnectivityHub".to_string(),
            namespace: "net".to_string(),
            name: "core".to_string(),
        };
        assert_eq!(not_found.reason(), "DependencyNotFound");
        assert_eq!(
            ReconcilerError::ProjectNotConfigured {
                namespace: "team-a".to_string()
            }
            .reason(),
            "DependencyNotFound"
        );
        assert_eq!(ReconcilerError::InvalidSpec("x".to_string()).reason(), "InvalidSpec");
        let delete = ReconcilerError::provider(
            ProviderOperation::Delete,
            ProviderError::new(ProviderErrorCode::Internal, "boom"),
        );
        assert_eq!(delete.reason(), "DeleteFailed");
        let get = ReconcilerError::provider(
            ProviderOperation::Get,
            ProviderError::new(ProviderErrorCode::PermissionDenied, "denied"),
        );
        assert_eq!(get.reason(), "UpdateFailed");
    }

    #[test]
    fn test_provider_error_message_is_preserved() {
        let err = ReconcilerError::provider(
            ProviderOperation::Get,
            ProviderError::new(
                ProviderErrorCode::PermissionDenied,
                "Error 403: The caller does not have permission",
            ),
        );
        assert_eq!(
            err.to_string(),
            "provider get failed: Error 403: The caller does not have permission"
        );
    }

    #[test]
    fn test_project_not_configured_names_annotation() {
        let err = ReconcilerError::ProjectNotConfigured {
            namespace: "team-a".to_string(),
        };
        assert!(err.to_string().contains(PROJECT_ID_ANNOTATION));
        assert!(err.is_unresolved_reference());
    }
}
