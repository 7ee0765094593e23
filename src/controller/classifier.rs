//! # Error Classifier
//!
//! Decides whether a failed reconcile is worth retrying on the short interval.
//!
//! Structured information always wins: a [`ProviderErrorCode`] or a typed
//! [`ReconcilerError`] variant. Only a provider error without a code falls back to
//! [`classify_message`], which matches known symptoms in the error text.
//!
//! Transient failures are the ones that go away on their own: optimistic-concurrency
//! conflicts, capacity limits, and propagation lag (an IAM binding that has not reached
//! the provider yet reports permission denied for a while). Terminal failures need a
//! change to the resource: malformed input, a hard quota, an unsupported operation.

use crate::controller::reconciler::ReconcilerError;
use crate::provider::{ProviderError, ProviderErrorCode};
use std::fmt;

/// Result of classifying an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Expected to resolve without user action; retried on the short interval
    Transient,
    /// Needs user action; surfaced immediately
    Terminal,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        self == Self::Transient
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a reconcile error
pub fn classify(error: &ReconcilerError) -> ErrorClass {
    match error {
        // Both "does not exist yet" and "never will" look the same from here; the bounded
        // retry budget covers the second case.
        ReconcilerError::ReferenceNotFound { .. }
        | ReconcilerError::ReferenceNotReady { .. }
        | ReconcilerError::ProjectNotConfigured { .. } => ErrorClass::Transient,
        ReconcilerError::InvalidSpec(_) | ReconcilerError::Serialization(_) => ErrorClass::Terminal,
        ReconcilerError::Provider { source, .. } => classify_provider_error(source),
        ReconcilerError::Store(_) => ErrorClass::Transient,
    }
}

/// Classify a provider error: structured code first, message otherwise
pub fn classify_provider_error(error: &ProviderError) -> ErrorClass {
    match error.code {
        Some(code) => classify_code(code),
        None => classify_message(&error.message),
    }
}

pub fn classify_code(code: ProviderErrorCode) -> ErrorClass {
    match code {
        ProviderErrorCode::PermissionDenied
        | ProviderErrorCode::Unauthenticated
        | ProviderErrorCode::Conflict
        | ProviderErrorCode::Aborted
        | ProviderErrorCode::Unavailable
        | ProviderErrorCode::DeadlineExceeded
        | ProviderErrorCode::ResourceExhausted
        | ProviderErrorCode::Internal
        | ProviderErrorCode::NotFound
        | ProviderErrorCode::AlreadyExists => ErrorClass::Transient,
        ProviderErrorCode::InvalidArgument
        | ProviderErrorCode::FailedPrecondition
        | ProviderErrorCode::QuotaExceeded
        | ProviderErrorCode::Unimplemented => ErrorClass::Terminal,
    }
}

/// Symptoms of failures that clear up without user action
const TRANSIENT_PATTERNS: &[&str] = &[
    "does not have permission",
    "permission denied",
    "not yet propagated",
    "the object has been modified",
    "conflict",
    "concurrent",
    "rate limit",
    "too many requests",
    "try again",
    "temporarily unavailable",
    "service unavailable",
    "connection reset",
    "connection refused",
    "timed out",
    "timeout",
    "deadline exceeded",
    "internal error",
];

/// Symptoms of failures that need a change to the resource
const TERMINAL_PATTERNS: &[&str] = &[
    "invalid argument",
    "invalid value",
    "malformed",
    "failed precondition",
    "quota exceeded",
    "not implemented",
    "unimplemented",
    "validation failed",
    "schema",
];

/// Classify from the error text alone
///
/// Used only when no structured code is available. Unknown messages are transient: a
/// wrong guess costs a few short retries before the error is surfaced anyway.
pub fn classify_message(message: &str) -> ErrorClass {
    let message = message.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::Transient;
    }
    if TERMINAL_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::Terminal;
    }
    ErrorClass::Transient
}
