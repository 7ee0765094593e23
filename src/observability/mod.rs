//! # Observability
//!
//! Prometheus metrics for the controller. Logging goes through `tracing` and is set up in
//! [`crate::runtime::initialization`].

pub mod metrics;
