//! # Reconcile-Result Verifier
//!
//! Checks a reconcile's outcome against an expected schedule and error, the way an
//! integration test or a smoke check wants it checked:
//!
//! - `requeue` must match exactly
//! - `requeue_after` must fall in `[expected - mean/2, expected + mean/2)`, which absorbs the
//!   jitter applied to success schedules
//! - the error must match the expected pattern, or be absent when none is expected
//!
//! Reconciles failing with a permission error are re-run a few times first, since freshly
//! granted provider permissions take a while to propagate.

use crate::constants::{
    DEFAULT_MEAN_RECONCILE_PERIOD_SECS, DEFAULT_TRANSIENT_MAX_RETRIES,
    DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS,
};
use crate::controller::reconciler::ReconcileFailure;
use crate::controller::schedule::ReconcileSchedule;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Message fragment of errors the verifier retries
pub const FLAKY_ERROR_MESSAGE: &str = "The caller does not have permission";

/// Mismatch between a reconcile's outcome and the expectation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("reconcile returned unexpected error: {0}")]
    UnexpectedError(String),

    #[error("reconcile returned no error, expected one matching '{pattern}'")]
    MissingError { pattern: String },

    #[error("error '{error}' does not match regex '{pattern}'")]
    ErrorMismatch { error: String, pattern: String },

    #[error("reconcile result mismatch: got {actual:?}, want within {tolerance:?} of {expected:?}")]
    ScheduleMismatch {
        actual: ReconcileSchedule,
        expected: ReconcileSchedule,
        tolerance: Duration,
    },
}

/// What one reconcile produced: the schedule, plus the error message if it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub schedule: ReconcileSchedule,
    pub error: Option<String>,
}

impl From<Result<ReconcileSchedule, ReconcileFailure>> for ReconcileResult {
    fn from(result: Result<ReconcileSchedule, ReconcileFailure>) -> Self {
        match result {
            Ok(schedule) => Self {
                schedule,
                error: None,
            },
            Err(failure) => Self {
                schedule: failure.schedule,
                error: Some(failure.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileVerifier {
    pub mean_period: Duration,
    /// Total runs when the reconcile keeps failing with a flaky error
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for ReconcileVerifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_MEAN_RECONCILE_PERIOD_SECS))
    }
}

impl ReconcileVerifier {
    pub fn new(mean_period: Duration) -> Self {
        Self {
            mean_period,
            max_attempts: DEFAULT_TRANSIENT_MAX_RETRIES,
            retry_interval: Duration::from_secs(DEFAULT_TRANSIENT_RETRY_INTERVAL_SECS),
        }
    }

    /// Schedule of a successful reconcile, before jitter
    pub fn expected_success(&self) -> ReconcileSchedule {
        ReconcileSchedule::after(self.mean_period)
    }

    /// Schedule of a failure that is not retried
    pub fn expected_unsuccessful() -> ReconcileSchedule {
        ReconcileSchedule::none()
    }

    /// `{true, 0}`: re-run as soon as possible
    pub fn expected_requeue() -> ReconcileSchedule {
        ReconcileSchedule {
            requeue: true,
            requeue_after: Duration::ZERO,
        }
    }

    /// `requeue` equal and `requeue_after` within half a mean period of the expectation
    pub fn requeue_within_bounds(&self, actual: &ReconcileSchedule, expected: &ReconcileSchedule) -> bool {
        let tolerance = self.mean_period / 2;
        let lower = expected.requeue_after.saturating_sub(tolerance);
        let upper = expected.requeue_after + tolerance;
        actual.requeue == expected.requeue
            && actual.requeue_after >= lower
            && actual.requeue_after < upper
    }

    /// Check one result against the expected schedule and error pattern
    pub fn check(
        &self,
        actual: &ReconcileResult,
        expected: &ReconcileSchedule,
        expected_error: Option<&Regex>,
    ) -> Result<(), VerificationError> {
        match (expected_error, &actual.error) {
            (None, Some(error)) => return Err(VerificationError::UnexpectedError(error.clone())),
            (Some(pattern), None) => {
                return Err(VerificationError::MissingError {
                    pattern: pattern.as_str().to_string(),
                })
            }
            (Some(pattern), Some(error)) if !pattern.is_match(error) => {
                return Err(VerificationError::ErrorMismatch {
                    error: error.clone(),
                    pattern: pattern.as_str().to_string(),
                })
            }
            _ => {}
        }

        if self.requeue_within_bounds(&actual.schedule, expected) {
            Ok(())
        } else {
            Err(VerificationError::ScheduleMismatch {
                actual: actual.schedule,
                expected: *expected,
                tolerance: self.mean_period / 2,
            })
        }
    }

    /// Run `reconcile`, re-running it while it fails with a flaky error, and check the last
    /// result
    pub async fn run_and_assert<F, Fut>(
        &self,
        mut reconcile: F,
        expected: &ReconcileSchedule,
        expected_error: Option<&Regex>,
    ) -> Result<ReconcileResult, VerificationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ReconcileSchedule, ReconcileFailure>>,
    {
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let result = ReconcileResult::from(reconcile().await);
            match result.error.as_deref() {
                Some(error) if is_flaky_error(error) && attempt < self.max_attempts => {
                    info!(attempt, "detected transient error, will retry: {}", error);
                    tokio::time::sleep(self.retry_interval).await;
                }
                Some(error) if is_flaky_error(error) => {
                    info!(attempt, "detected transient error, but maximum number of retries reached: {}", error);
                    break result;
                }
                _ => break result,
            }
        };

        debug!(?result, "checking reconcile result");
        self.check(&result, expected, expected_error)?;
        Ok(result)
    }
}

/// Whether a reconcile error is a permission flake worth re-running
pub fn is_flaky_error(message: &str) -> bool {
    message.contains(FLAKY_ERROR_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::classifier::ErrorClass;
    use crate::controller::reconciler::ReconcilerError;
    use crate::provider::{ProviderError, ProviderOperation};

    fn verifier() -> ReconcileVerifier {
        ReconcileVerifier::new(Duration::from_secs(600))
    }

    fn ok(schedule: ReconcileSchedule) -> ReconcileResult {
        ReconcileResult {
            schedule,
            error: None,
        }
    }

    #[test]
    fn test_bounds_are_half_open() {
        let v = verifier();
        let expected = v.expected_success();
        assert!(v.requeue_within_bounds(&ReconcileSchedule::after(Duration::from_secs(300)), &expected));
        assert!(v.requeue_within_bounds(&ReconcileSchedule::after(Duration::from_secs(899)), &expected));
        assert!(!v.requeue_within_bounds(&ReconcileSchedule::after(Duration::from_secs(900)), &expected));
        assert!(!v.requeue_within_bounds(&ReconcileSchedule::after(Duration::from_secs(299)), &expected));
    }

    #[test]
    fn test_requeue_flag_must_match() {
        let v = verifier();
        let actual = ReconcileSchedule {
            requeue: true,
            requeue_after: Duration::ZERO,
        };
        assert!(v.requeue_within_bounds(&actual, &ReconcileVerifier::expected_requeue()));
        assert!(!v.requeue_within_bounds(
            &ReconcileSchedule::none(),
            &ReconcileVerifier::expected_requeue()
        ));
        assert!(!v.requeue_within_bounds(&actual, &ReconcileVerifier::expected_unsuccessful()));
        assert!(v.requeue_within_bounds(
            &ReconcileSchedule::none(),
            &ReconcileVerifier::expected_unsuccessful()
        ));
    }

    #[test]
    fn test_check_error_expectations() {
        let v = verifier();
        let expected = ReconcileVerifier::expected_unsuccessful();
        let failed = ReconcileResult {
            schedule: ReconcileSchedule::none(),
            error: Some("provider get failed: Error 400: bad request".to_string()),
        };

        assert!(matches!(
            v.check(&failed, &expected, None),
            Err(VerificationError::UnexpectedError(_))
        ));

        let pattern = Regex::new("Error 400").unwrap();
        assert_eq!(v.check(&failed, &expected, Some(&pattern)), Ok(()));

        let other = Regex::new("Error 409").unwrap();
        assert!(matches!(
            v.check(&failed, &expected, Some(&other)),
            Err(VerificationError::ErrorMismatch { .. })
        ));

        assert!(matches!(
            v.check(&ok(ReconcileSchedule::none()), &expected, Some(&pattern)),
            Err(VerificationError::MissingError { .. })
        ));
    }

    #[test]
    fn test_schedule_mismatch_reports_both() {
        let v = verifier();
        let err = v
            .check(&ok(ReconcileSchedule::none()), &v.expected_success(), None)
            .unwrap_err();
        assert!(matches!(err, VerificationError::ScheduleMismatch { .. }));
        assert!(err.to_string().contains("300s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_flake_stops_after_max_attempts() {
        let v = verifier();
        let mut runs = 0;
        let started = tokio::time::Instant::now();

        let err = v
            .run_and_assert(
                || {
                    runs += 1;
                    std::future::ready(Err(ReconcileFailure {
                        schedule: ReconcileSchedule::after(Duration::from_secs(5)),
                        class: ErrorClass::Transient,
                        source: ReconcilerError::provider(
                            ProviderOperation::Get,
                            ProviderError::unstructured(
                                "googleapi: Error 403: The caller does not have permission",
                            ),
                        ),
                    }))
                },
                &ReconcileVerifier::expected_unsuccessful(),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, VerificationError::UnexpectedError(_)));
        assert_eq!(runs, 5);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn test_is_flaky_error() {
        assert!(is_flaky_error(
            "provider get failed: googleapi: Error 403: The caller does not have permission"
        ));
        assert!(!is_flaky_error("Error 403: forbidden"));
    }
}
