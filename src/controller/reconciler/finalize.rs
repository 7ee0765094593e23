//! # Deletion
//!
//! Drains the remote object of a resource marked for deletion, then releases the finalizer.

use super::dependencies::resolve_all;
use super::{Reconciler, ReconcilerError, Step};
use crate::constants::FINALIZER;
use crate::crd::ManagedResource;
use crate::provider::ProviderOperation;
use crate::store::StoreError;
use kube::ResourceExt;
use tracing::{debug, info, warn};

impl<K: ManagedResource> Reconciler<K> {
    pub(super) async fn finalize(&self, resource: K) -> Result<Step, ReconcilerError> {
        if !resource.has_finalizer(FINALIZER) {
            debug!("deletion in progress without our finalizer, nothing to do");
            return Ok(Step::Gone);
        }

        let desired = match resolve_all(self.resolver.as_ref(), &resource).await {
            Ok(resolved) => resource.desired_state(&resolved),
            Err(error) => Err(error),
        };

        match desired {
            Ok(desired) => match self.actuator.delete(&desired).await {
                Ok(()) => info!(remote = %desired.name(), "deleted remote object"),
                Err(e) if e.is_not_found() => {
                    debug!(remote = %desired.name(), "remote object already gone");
                }
                Err(e) => {
                    let error = ReconcilerError::provider(ProviderOperation::Delete, e);
                    if !self.record_failure(resource, &error).await {
                        return Ok(Step::Gone);
                    }
                    return Err(error);
                }
            },
            // Without its references the remote name cannot be computed; leave the object.
            Err(error)
                if error.is_unresolved_reference()
                    || matches!(error, ReconcilerError::InvalidSpec(_)) =>
            {
                warn!(error = %error, "cannot compute remote object during deletion, abandoning it");
            }
            Err(error) => return Err(error),
        }

        let finalizers: Vec<String> = resource
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        match self.store.replace_finalizers(&resource, finalizers).await {
            Ok(_) | Err(StoreError::NotFound(_)) => Ok(Step::Finalized),
            Err(e) => Err(e.into()),
        }
    }
}
