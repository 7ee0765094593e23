//! # In-Memory Backends
//!
//! Process-local implementations of the controller's external collaborators:
//!
//! - [`InMemoryResourceStore`] and [`InMemoryNamespaceStore`]: versioned object storage with
//!   the same optimistic-concurrency behaviour as the API server, plus conflict injection
//! - [`InMemoryActuator`]: a simulated provider with scriptable failures and a call log
//! - [`InMemoryDependencyResolver`]: references registered up front
//!
//! Used by the test suites and by `PROVIDER_BACKEND=memory` for local clusters.

mod actuator;
mod resolver;
mod store;

pub use actuator::InMemoryActuator;
pub use resolver::InMemoryDependencyResolver;
pub use store::{InMemoryNamespaceStore, InMemoryResourceStore};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock ignoring poisoning; the guarded maps stay consistent across a panicking test
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
