//! # Initialization
//!
//! Controller startup: rustls provider, tracing, metrics, HTTP server, Kubernetes client and
//! the shared reconcile dependencies (actuator, resolver, kind registry).

use crate::config::{ControllerConfig, ProviderBackend, ServerConfig};
use crate::controller::reconciler::{DependencyResolver, KubeDependencyResolver, Reconciler};
use crate::controller::schedule::SchedulePolicy;
use crate::controller::server::{start_server, ServerState};
use crate::crd::ManagedResource;
use crate::memory::InMemoryActuator;
use crate::observability;
use crate::provider::rest::RestActuator;
use crate::provider::ResourceActuator;
use crate::registry::KindRegistry;
use crate::runtime::shutdown::ShutdownCoordinator;
use crate::store::{KubeNamespaceStore, KubeResourceStore};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything the controllers need, built once at startup
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    pub registry: Arc<KindRegistry>,
    pub actuator: Arc<dyn ResourceActuator>,
    pub resolver: Arc<dyn DependencyResolver>,
    pub server_state: Arc<ServerState>,
    pub shutdown: ShutdownCoordinator,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

impl InitializationResult {
    /// Reconciler for kind `K` sharing the actuator and resolver
    pub fn reconciler<K: ManagedResource>(&self) -> Arc<Reconciler<K>> {
        Arc::new(Reconciler::new(
            Arc::new(KubeResourceStore::<K>::new(self.client.clone())),
            Arc::clone(&self.actuator),
            Arc::clone(&self.resolver),
            SchedulePolicy::from_config(&self.config),
        ))
    }
}

pub async fn initialize(config: ControllerConfig, server_config: ServerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloud_resource_controller=info".into()),
        )
        .init();

    info!("Starting Cloud Resource Controller v{}", env!("CARGO_PKG_VERSION"));
    info!(
        mean_reconcile_period = ?config.mean_reconcile_period,
        transient_max_retries = config.transient_max_retries,
        transient_retry_interval = ?config.transient_retry_interval,
        provider_backend = ?config.provider_backend,
        "Controller configuration"
    );

    observability::metrics::register_metrics()?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let token = shutdown.token();
        let port = server_config.metrics_port;
        shutdown.spawn(async move {
            if let Err(e) = start_server(port, state, token).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let registry = Arc::new(KindRegistry::with_builtin_kinds());
    let actuator = build_actuator(&config)?;
    let resolver: Arc<dyn DependencyResolver> = Arc::new(KubeDependencyResolver::new(
        client.clone(),
        Arc::clone(&registry),
        Arc::new(KubeNamespaceStore::new(client.clone())),
    ));

    info!("Controller initialized, starting watches...");

    Ok(InitializationResult {
        client,
        config,
        registry,
        actuator,
        resolver,
        server_state,
        shutdown,
    })
}

fn build_actuator(config: &ControllerConfig) -> Result<Arc<dyn ResourceActuator>> {
    match config.provider_backend {
        ProviderBackend::Rest => {
            info!("Using REST provider at {}", config.provider_endpoint);
            let actuator = RestActuator::new(config.provider_endpoint.clone(), config.provider_token.clone())
                .context("Failed to build REST provider client")?;
            Ok(Arc::new(actuator))
        }
        ProviderBackend::Memory => {
            warn!("Using the in-memory provider; remote objects live only in this process");
            Ok(Arc::new(InMemoryActuator::new()))
        }
    }
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_listening.load(Ordering::Relaxed) {
            info!("HTTP server is accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
