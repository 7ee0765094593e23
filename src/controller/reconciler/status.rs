//! # Status Management
//!
//! Writes reconcile results to the resource's Ready condition.
//!
//! `observedGeneration` only advances on success, so it equals `metadata.generation`
//! exactly when the latest attempt for that generation succeeded.

use super::{Reconciler, ReconcilerError, Step};
use crate::constants::READY_CONDITION;
use crate::crd::{set_condition, Condition, ConditionStatus, ManagedResource, ManagedStatus};
use crate::provider::ProviderOutput;
use crate::store::StoreError;
use tracing::{debug, warn};

const UP_TO_DATE_REASON: &str = "UpToDate";
const UP_TO_DATE_MESSAGE: &str = "The resource is up to date";

impl<K: ManagedResource> Reconciler<K> {
    pub(super) async fn record_success(
        &self,
        resource: K,
        output: &ProviderOutput,
        generation: Option<i64>,
    ) -> Result<Step, ReconcilerError> {
        let mut status = resource.status().cloned().unwrap_or_default();
        status.apply_output(output);
        set_condition(
            status.conditions_mut(),
            Condition::new(
                READY_CONDITION,
                ConditionStatus::True,
                UP_TO_DATE_REASON,
                UP_TO_DATE_MESSAGE,
            ),
        );
        status.set_observed_generation(generation);

        match self.write_status(resource, status).await {
            Ok(()) => Ok(Step::Synced),
            Err(StoreError::NotFound(_)) => {
                debug!("resource deleted before its status could be written");
                Ok(Step::Gone)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Report `error` on the Ready condition
    ///
    /// Returns false if the resource vanished in the meantime. Other write failures are
    /// logged and swallowed so the original error is the one surfaced.
    pub(super) async fn record_failure(&self, resource: K, error: &ReconcilerError) -> bool {
        let mut status = resource.status().cloned().unwrap_or_default();
        set_condition(
            status.conditions_mut(),
            Condition::new(
                READY_CONDITION,
                ConditionStatus::False,
                error.reason(),
                error.to_string(),
            ),
        );

        match self.write_status(resource, status).await {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => {
                debug!("resource deleted before its status could be written");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to record failure in status");
                true
            }
        }
    }

    /// Write `status` unless it is unchanged, to avoid triggering our own watch
    async fn write_status(&self, mut resource: K, status: K::Status) -> Result<(), StoreError> {
        if resource.status() == Some(&status) {
            debug!("status unchanged, skipping write");
            return Ok(());
        }
        *resource.status_mut() = status;
        self.store.replace_status(&resource).await?;
        Ok(())
    }
}
