//! # Provider Sync
//!
//! Brings the remote object in line with the resource's spec.

use super::dependencies::resolve_all;
use super::{Reconciler, ReconcilerError};
use crate::constants::FINALIZER;
use crate::crd::ManagedResource;
use crate::provider::{has_drift, ObservedState, ProviderOperation};
use kube::ResourceExt;
use tracing::{debug, info};

impl<K: ManagedResource> Reconciler<K> {
    /// Create or update the remote object if it drifted from the desired state
    ///
    /// `resource` is replaced by the version last written (adding the finalizer bumps it), so
    /// the status write that follows is preconditioned on the right version.
    pub(super) async fn sync(&self, resource: &mut K) -> Result<ObservedState, ReconcilerError> {
        let resolved = resolve_all(self.resolver.as_ref(), resource).await?;
        let desired = resource.desired_state(&resolved)?;
        let name = desired.name();

        let current = match self.actuator.get(&desired).await {
            Ok(observed) => Some(observed),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(ReconcilerError::provider(ProviderOperation::Get, e)),
        };

        self.ensure_finalizer(resource).await?;

        let observed = match current {
            None => {
                info!(remote = %name, "creating remote object");
                self.actuator
                    .create(&desired)
                    .await
                    .map_err(|e| ReconcilerError::provider(ProviderOperation::Create, e))?
            }
            Some(observed) if has_drift(&desired.config, &observed.config) => {
                info!(remote = %name, "remote object drifted, updating");
                self.actuator
                    .update(&desired)
                    .await
                    .map_err(|e| ReconcilerError::provider(ProviderOperation::Update, e))?
            }
            Some(observed) => {
                debug!(remote = %name, "remote object up to date");
                observed
            }
        };

        Ok(observed)
    }

    /// Add the finalizer so deletion can drain the remote object
    async fn ensure_finalizer(&self, resource: &mut K) -> Result<(), ReconcilerError> {
        if resource.has_finalizer(FINALIZER) {
            return Ok(());
        }
        let mut finalizers = resource.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        debug!(finalizer = FINALIZER, "adding finalizer");
        *resource = self.store.replace_finalizers(resource, finalizers).await?;
        Ok(())
    }
}
