//! # Cloud Resource Controller
//!
//! Operator binary: watches every managed kind and reconciles it against the provider.
//! Configuration comes from the environment (see [`cloud_resource_controller::config`]).

use anyhow::Result;
use cloud_resource_controller::config::load_config;
use cloud_resource_controller::runtime::{initialize, run_controllers};

#[tokio::main]
async fn main() -> Result<()> {
    let (controller_config, server_config) = load_config();
    let init_result = initialize(controller_config, server_config).await?;
    run_controllers(init_result).await
}
