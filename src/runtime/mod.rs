//! # Runtime Module
//!
//! Process-level wiring: initialization, one `kube_runtime` controller per managed kind,
//! and coordinated shutdown.

pub mod controller;
pub mod initialization;
pub mod shutdown;

pub use controller::{controller_for, error_policy, reconcile};
pub use initialization::{initialize, InitializationResult};
pub use shutdown::ShutdownCoordinator;

use crate::crd::{MonitoringService, NetworkConnectivitySpoke, SourceRepoRepository};
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// How long shutdown waits for in-flight work
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a controller per managed kind until shutdown, then drain
pub async fn run_controllers(init: InitializationResult) -> Result<()> {
    let token = init.shutdown.token();
    let controllers = vec![
        controller_for(init.client.clone(), init.reconciler::<SourceRepoRepository>(), token.clone()),
        controller_for(init.client.clone(), init.reconciler::<MonitoringService>(), token.clone()),
        controller_for(init.client.clone(), init.reconciler::<NetworkConnectivitySpoke>(), token.clone()),
    ];
    let handles: Vec<_> = controllers
        .into_iter()
        .map(|controller| init.shutdown.spawn(controller))
        .collect();

    init.server_state.set_ready(true);
    info!("{} controllers running", handles.len());

    token.cancelled().await;
    init.server_state.set_ready(false);
    init.shutdown.drain(SHUTDOWN_DRAIN_TIMEOUT).await;
    info!("All controllers stopped");
    Ok(())
}
