//! # Retry/Backoff Scheduler
//!
//! Turns the outcome of one reconcile into the schedule handed back to the substrate.
//!
//! | Outcome | Schedule |
//! |---|---|
//! | success | `{false, mean}` (jittered by the caller) |
//! | transient, attempt < max | `{false, retry interval}` |
//! | transient, attempt >= max | `{false, 0}`, error surfaced |
//! | terminal | `{false, 0}`, error surfaced |

use crate::config::ControllerConfig;
use kube_runtime::controller::Action;
use rand::Rng;
use std::time::Duration;

/// Outcome of one reconcile attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success,
    TransientFailure,
    TerminalFailure,
}

/// What the substrate should do after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSchedule {
    /// Re-run as soon as possible
    pub requeue: bool,
    /// Re-run after this delay; zero means "only on the next change"
    pub requeue_after: Duration,
}

impl ReconcileSchedule {
    pub const fn after(delay: Duration) -> Self {
        Self {
            requeue: false,
            requeue_after: delay,
        }
    }

    /// `{false, 0}`: no automatic re-run
    pub const fn none() -> Self {
        Self {
            requeue: false,
            requeue_after: Duration::ZERO,
        }
    }

    /// Convert to a kube-runtime action
    pub fn into_action(self) -> Action {
        if !self.requeue_after.is_zero() {
            Action::requeue(self.requeue_after)
        } else if self.requeue {
            Action::requeue(Duration::ZERO)
        } else {
            Action::await_change()
        }
    }
}

/// Scheduling constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub mean_period: Duration,
    pub transient_max_retries: u32,
    pub transient_retry_interval: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

impl SchedulePolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            mean_period: config.mean_reconcile_period,
            transient_max_retries: config.transient_max_retries,
            transient_retry_interval: config.transient_retry_interval,
        }
    }

    /// Schedule for `outcome`, where `attempt` counts the transient failures already retried
    pub fn next_schedule(&self, outcome: ReconcileOutcome, attempt: u32) -> ReconcileSchedule {
        match outcome {
            ReconcileOutcome::Success => ReconcileSchedule::after(self.mean_period),
            ReconcileOutcome::TransientFailure if attempt < self.transient_max_retries => {
                ReconcileSchedule::after(self.transient_retry_interval)
            }
            ReconcileOutcome::TransientFailure | ReconcileOutcome::TerminalFailure => {
                ReconcileSchedule::none()
            }
        }
    }

    /// The success period, jittered uniformly over `[mean/2, 3*mean/2)`
    pub fn jittered_period(&self) -> Duration {
        jitter(self.mean_period, &mut rand::thread_rng())
    }
}

/// Jitter `mean` uniformly over `[mean/2, 3*mean/2)`
pub fn jitter<R: Rng + ?Sized>(mean: Duration, rng: &mut R) -> Duration {
    if mean.is_zero() {
        return mean;
    }
    mean.mul_f64(rng.gen_range(0.5..1.5))
}
