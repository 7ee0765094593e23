//! # CRCTL CLI
//!
//! Command-line interface for the Cloud Resource Controller.
//!
//! ## Usage
//!
//! ```bash
//! # Print the CustomResourceDefinitions of the managed kinds
//! crctl crds > crds.yaml
//!
//! # Bind a namespace to a provider project
//! crctl bind-namespace team-a proj-123
//!
//! # Show the Ready condition of a managed resource
//! crctl status --kind SourceRepoRepository --name my-repo --namespace team-a
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cloud_resource_controller::config::ControllerConfig;
use cloud_resource_controller::constants::READY_CONDITION;
use cloud_resource_controller::controller::guard::{ensure_namespace_project, GuardPolicy};
use cloud_resource_controller::crd::{find_condition, Condition};
use cloud_resource_controller::registry::KindRegistry;
use cloud_resource_controller::store::KubeNamespaceStore;
use kube::api::{Api, DynamicObject, ListParams};
use kube::{Client, ResourceExt};

/// Cloud Resource Controller CLI
#[derive(Parser)]
#[command(name = "crctl")]
#[command(about = "Cloud Resource Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CustomResourceDefinitions of the managed kinds as YAML
    Crds,
    /// Bind a namespace to a provider project
    BindNamespace {
        /// Namespace to bind
        namespace: String,
        /// Provider project ID
        project: String,
    },
    /// Show the Ready condition of managed resources
    Status {
        /// Managed kind, e.g. SourceRepoRepository
        #[arg(short, long)]
        kind: String,

        /// Name of the resource (all resources of the kind when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Namespace of the resource
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crctl=info,cloud_resource_controller=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crds => crds_command(),
        Commands::BindNamespace { namespace, project } => {
            bind_namespace_command(client().await?, &namespace, &project).await
        }
        Commands::Status {
            kind,
            name,
            namespace,
        } => status_command(client().await?, &kind, name.as_deref(), &namespace).await,
    }
}

async fn client() -> Result<Client> {
    Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")
}

fn crds_command() -> Result<()> {
    for crd in KindRegistry::crds() {
        let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}

async fn bind_namespace_command(client: Client, namespace: &str, project: &str) -> Result<()> {
    let store = KubeNamespaceStore::new(client);
    let policy = GuardPolicy::from_config(&ControllerConfig::from_env());
    ensure_namespace_project(&store, &policy, namespace, project)
        .await
        .with_context(|| format!("Failed to bind namespace '{namespace}' to project '{project}'"))?;
    println!("✅ Namespace '{namespace}' is bound to project '{project}'");
    Ok(())
}

async fn status_command(client: Client, kind: &str, name: Option<&str>, namespace: &str) -> Result<()> {
    let registry = KindRegistry::with_builtin_kinds();
    match registry.get(kind) {
        Some(info) if info.managed => {}
        _ => bail!(
            "'{kind}' is not a managed kind (expected one of: {})",
            registry.managed_kinds().collect::<Vec<_>>().join(", ")
        ),
    }
    let resource = registry.api_resource(kind)?;
    let api: Api<DynamicObject> = Api::namespaced_with(client, namespace, &resource);

    let objects = match name {
        Some(name) => vec![api
            .get(name)
            .await
            .with_context(|| format!("Failed to get {kind} '{namespace}/{name}'"))?],
        None => api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {kind} in '{namespace}'"))?
            .items,
    };

    if objects.is_empty() {
        println!("No {kind} resources found in namespace '{namespace}'");
        return Ok(());
    }

    println!("{:<32} {:<8} {:<24} {:<10} MESSAGE", "NAME", "READY", "REASON", "OBSERVED");
    for object in &objects {
        let status = object.data.get("status");
        let conditions: Vec<Condition> = status
            .and_then(|s| s.get("conditions"))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default();
        let observed = status
            .and_then(|s| s.get("observedGeneration"))
            .and_then(serde_json::Value::as_i64)
            .map_or_else(|| "-".to_string(), |g| g.to_string());
        let generation = object
            .metadata
            .generation
            .map_or_else(|| "-".to_string(), |g| g.to_string());

        match find_condition(&conditions, READY_CONDITION) {
            Some(ready) => println!(
                "{:<32} {:<8} {:<24} {:<10} {}",
                object.name_any(),
                ready.status.to_string(),
                ready.reason,
                format!("{observed}/{generation}"),
                ready.message
            ),
            None => println!(
                "{:<32} {:<8} {:<24} {:<10} -",
                object.name_any(),
                "Unknown",
                "-",
                format!("{observed}/{generation}")
            ),
        }
    }
    Ok(())
}
