//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, errors, requeues, annotation conflicts
//! - `provider_metrics` - Remote provider calls

pub mod controller_metrics;
pub mod provider_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use provider_metrics::*;
pub use registry::*;
