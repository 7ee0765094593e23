//! # Cloud Resource Controller
//!
//! A Kubernetes controller that keeps declared cloud resources (source repositories,
//! monitoring services, network connectivity spokes) in sync with a remote provider API.
//!
//! ## Overview
//!
//! For every managed resource the controller:
//!
//! 1. **Resolves references** - the project and any resources the spec points at must exist
//!    and be Ready
//! 2. **Diffs against the provider** - reads the remote object and compares it with the
//!    desired configuration
//! 3. **Acts** - creates, updates or, on deletion, deletes the remote object
//! 4. **Reports** - writes a `Ready` condition and `observedGeneration` to status
//! 5. **Schedules** - requeues around a jittered mean period on success, retries transient
//!    failures a bounded number of times, and surfaces terminal ones immediately
//!
//! Namespace project bindings are shared state between tenants and are written through a
//! compare-and-set guard (see [`controller::guard`]).

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod memory;
pub mod observability;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod verification;
