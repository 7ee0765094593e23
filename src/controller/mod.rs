//! # Controller
//!
//! The reconciliation core and the machinery around it:
//!
//! - `reconciler` - per-resource state machine
//! - `classifier` - transient vs terminal failures
//! - `schedule` - next reconcile schedule and jitter
//! - `guard` - compare-and-set of shared namespace annotations
//! - `server` - metrics and probe endpoints

pub mod classifier;
pub mod guard;
pub mod reconciler;
pub mod schedule;
pub mod server;
