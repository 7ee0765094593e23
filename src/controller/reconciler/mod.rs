//! # Reconciler
//!
//! Per-resource state machine: fetch, resolve references, diff against the provider,
//! act, report status, and decide when to run again.
//!
//! ```text
//! get ──► gone? ──► {false, 0}
//!  │
//!  ├─► deleting ──► finalize (delete remote, drop finalizer) ──► {false, 0}
//!  │
//!  └─► resolve ──► desired ──► provider get ──► create / update / nothing
//!                                                   │
//!                     Ready=True, observedGeneration ◄┘  ──► {false, mean ± mean/2}
//! ```
//!
//! Any error is written to the Ready condition, classified, and turned into a schedule by
//! [`SchedulePolicy`]. Consecutive transient failures are counted per resource; the count
//! resets on success, on a terminal failure, once the budget is spent, and when the resource
//! is gone. Counts whose retry never came back within a mean period (the resource was
//! removed without a finalizer) are pruned on the next failure.

mod dependencies;
mod error;
mod finalize;
mod status;
mod sync;

pub use dependencies::{resolve_all, DependencyResolver, KubeDependencyResolver};
pub(crate) use dependencies::reference_error;
pub use error::{ReconcileFailure, ReconcilerError};

use crate::controller::classifier::{classify, ErrorClass};
use crate::controller::schedule::{ReconcileOutcome, ReconcileSchedule, SchedulePolicy};
use crate::crd::{ManagedResource, ResourceKey};
use crate::observability::metrics;
use crate::provider::ResourceActuator;
use crate::store::ResourceStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, error, info_span, warn, Instrument};

/// How a reconcile that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The resource no longer exists
    Gone,
    /// Deletion was handled and the finalizer removed
    Finalized,
    /// Provider and status are in sync with the spec
    Synced,
}

#[derive(Debug, Clone, Copy)]
struct TransientAttempts {
    count: u32,
    last_failure: TokioInstant,
}

/// Reconciler for managed resources of kind `K`
pub struct Reconciler<K: ManagedResource> {
    store: Arc<dyn ResourceStore<K>>,
    actuator: Arc<dyn ResourceActuator>,
    resolver: Arc<dyn DependencyResolver>,
    policy: SchedulePolicy,
    /// Consecutive transient failures already retried, per resource
    attempts: Mutex<HashMap<ResourceKey, TransientAttempts>>,
}

impl<K: ManagedResource> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind_name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> Reconciler<K> {
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        actuator: Arc<dyn ResourceActuator>,
        resolver: Arc<dyn DependencyResolver>,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            store,
            actuator,
            resolver,
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Transient failures already retried for `key`
    pub fn attempt_count(&self, key: &ResourceKey) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |attempts| attempts.count)
    }

    /// Reconcile one resource
    ///
    /// Returns the schedule on success. On failure the returned [`ReconcileFailure`]
    /// carries both the error and the schedule computed for it.
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileSchedule, ReconcileFailure> {
        let kind = K::kind_name();
        let span = info_span!(
            "reconcile",
            resource.kind = %kind,
            resource.namespace = %key.namespace,
            resource.name = %key.name,
        );

        async {
            let started = Instant::now();
            metrics::increment_reconciliations(&kind);
            let result = self.run(key).await;
            metrics::observe_reconciliation_duration(&kind, started.elapsed().as_secs_f64());

            match result {
                Ok(Step::Synced) => {
                    self.reset_attempts(key);
                    let schedule = self.success_schedule();
                    debug!(requeue_after = ?schedule.requeue_after, "reconcile succeeded");
                    metrics::increment_requeues_total("resync");
                    Ok(schedule)
                }
                Ok(Step::Gone | Step::Finalized) => {
                    self.reset_attempts(key);
                    Ok(ReconcileSchedule::none())
                }
                Err(source) => Err(self.fail(&kind, key, source)),
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, key: &ResourceKey) -> Result<Step, ReconcilerError> {
        let Some(resource) = self.store.get(key).await? else {
            debug!("resource no longer exists, nothing to do");
            return Ok(Step::Gone);
        };

        if resource.is_being_deleted() {
            return self.finalize(resource).await;
        }

        let mut resource = resource;
        let generation = resource.generation();
        match self.sync(&mut resource).await {
            Ok(observed) => self.record_success(resource, &observed.output, generation).await,
            Err(error) => {
                if !self.record_failure(resource, &error).await {
                    return Ok(Step::Gone);
                }
                Err(error)
            }
        }
    }

    fn fail(&self, kind: &str, key: &ResourceKey, source: ReconcilerError) -> ReconcileFailure {
        let class = classify(&source);
        let schedule = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            let now = TokioInstant::now();
            let stale_after = self.policy.mean_period;
            attempts.retain(|_, entry| now.duration_since(entry.last_failure) <= stale_after);
            match class {
                ErrorClass::Terminal => {
                    attempts.remove(key);
                    self.policy.next_schedule(ReconcileOutcome::TerminalFailure, 0)
                }
                ErrorClass::Transient => {
                    let prior = attempts.get(key).map_or(0, |entry| entry.count);
                    let schedule = self
                        .policy
                        .next_schedule(ReconcileOutcome::TransientFailure, prior);
                    if schedule.requeue_after.is_zero() {
                        attempts.remove(key);
                    } else {
                        attempts.insert(
                            key.clone(),
                            TransientAttempts {
                                count: prior + 1,
                                last_failure: now,
                            },
                        );
                    }
                    schedule
                }
            }
        };

        metrics::increment_reconciliation_errors(kind, class.as_str());
        if schedule.requeue_after.is_zero() {
            error!(error = %source, class = %class, "reconcile failed");
        } else {
            warn!(
                error = %source,
                attempt = self.attempt_count(key),
                retry_in = ?schedule.requeue_after,
                "transient reconcile failure, retrying"
            );
            metrics::increment_requeues_total("transient-retry");
        }

        ReconcileFailure {
            schedule,
            class,
            source,
        }
    }

    /// Mean resync period, jittered so healthy resources do not resync in lockstep
    fn success_schedule(&self) -> ReconcileSchedule {
        ReconcileSchedule::after(self.policy.jittered_period())
    }

    fn reset_attempts(&self, key: &ResourceKey) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
