//! # Shutdown
//!
//! One cancellation token shared by the controllers and the HTTP server, cancelled on
//! SIGTERM or SIGINT. Spawned tasks are tracked so shutdown can wait for them to drain.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
            self.token.cancel();
        }
    }

    /// Spawn a task that shutdown waits for
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Cancel the token on SIGTERM or SIGINT
    pub fn install_signal_handlers(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            coordinator.shutdown();
        });
    }

    /// Wait for tracked tasks to finish, up to `timeout`
    pub async fn drain(&self, timeout: Duration) {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                "{} task(s) still running after {}s, exiting anyway",
                self.tracker.len(),
                timeout.as_secs()
            );
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
