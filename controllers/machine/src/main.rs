//! Machine Controller
//!
//! Provisions hosts with docker-machine from `Machine` resources
//! (`docker-machine.klusters.dev/v1alpha1`):
//! - builds AWS network prerequisites for the amazonec2 driver
//! - hands the startup script and driver credentials to `docker-machine create`
//! - tracks completion of the startup script
//! - removes the host and everything created for it on deletion

mod ami;
mod backoff;
mod cloud;
mod config;
mod controller;
mod driver;
mod error;
mod executor;
mod jobs;
mod reconciler;
mod secrets;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube and reqwest both use rustls; pick the provider before any client exists
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| {
            ControllerError::InvalidConfig("a rustls crypto provider is already installed".to_string())
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("machine_controller=info")),
        )
        .init();

    info!("Starting Machine Controller");

    let config = ControllerConfig::from_env();
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  docker-machine: {}", config.docker_machine_binary);
    info!("  Script directory: {}", config.script_directory.display());
    info!("  Script poll interval: {}s", config.script_poll_interval.as_secs());

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
