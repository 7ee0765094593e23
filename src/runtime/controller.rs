//! # Controller Wiring
//!
//! Adapts a [`Reconciler`] to `kube_runtime::Controller`: one watch per managed kind, all
//! stopping when the shutdown token is cancelled.

use crate::controller::reconciler::{ReconcileFailure, Reconciler};
use crate::crd::{ManagedResource, ResourceKey};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::{Api, Client};
use kube_runtime::controller::Action;
use kube_runtime::watcher::Config as WatcherConfig;
use kube_runtime::Controller;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Watcher timeout (seconds), kept below the client read timeout so idle watches are
/// closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Reconcile entry point handed to the controller
pub async fn reconcile<K: ManagedResource>(
    resource: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcileFailure> {
    let key = ResourceKey::from_resource(resource.as_ref());
    ctx.reconcile(&key).await.map(|schedule| schedule.into_action())
}

/// Failures were already classified by the reconciler; apply the schedule it chose
pub fn error_policy<K: ManagedResource>(
    _resource: Arc<K>,
    failure: &ReconcileFailure,
    _ctx: Arc<Reconciler<K>>,
) -> Action {
    failure.schedule.into_action()
}

/// Controller future for kind `K`
pub fn controller_for<K: ManagedResource>(
    client: Client,
    reconciler: Arc<Reconciler<K>>,
    shutdown: CancellationToken,
) -> BoxFuture<'static, ()> {
    let kind = K::kind_name();
    info!("- {} controller", kind);
    let resources: Api<K> = Api::all(client);

    Controller::new(resources, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile::<K>, error_policy::<K>, reconciler)
        .for_each(log_reconcile_result(kind))
        .boxed()
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: String,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", kind),
            Err(e) => tracing::debug!(error = ?e, "{} reconciliation error", kind),
        }
        std::future::ready(())
    }
}
