//! Main controller implementation.
//!
//! Wires the Kubernetes-backed store, secrets and Job access, the local
//! docker-machine binary and the cloud client factory into a [`Reconciler`]
//! and runs the Machine watcher until it stops or the process is signalled.

use crate::cloud::SdkCloudClients;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::executor::DockerMachine;
use crate::jobs::KubeScriptJobs;
use crate::reconciler::Reconciler;
use crate::secrets::KubeSecretStore;
use crate::store::KubeMachineStore;
use crate::watcher::watch_machines;
use crds::Machine;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller for Machine resources.
#[derive(Debug)]
pub struct Controller {
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Machine Controller");

        let kube_client = Client::try_default().await?;
        let machine_api: Api<Machine> = match config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        tokio::fs::create_dir_all(&config.script_directory).await?;

        let concurrency = config.reconcile_concurrency;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeMachineStore::new(kube_client.clone())),
            Arc::new(KubeSecretStore::new(kube_client.clone())),
            Arc::new(DockerMachine::new(config.docker_machine_binary.clone())),
            Arc::new(KubeScriptJobs::new(kube_client)),
            Arc::new(SdkCloudClients),
            config,
        ));

        let machine_watcher = tokio::spawn(async move {
            watch_machines(machine_api, reconciler, concurrency).await
        });

        Ok(Self { machine_watcher })
    }

    /// Runs until the watcher exits or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Machine Controller running");

        tokio::select! {
            result = self.machine_watcher => match result {
                Ok(Ok(())) => warn!("Machine watcher stopped"),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(ControllerError::Watch(format!("Machine watcher task failed: {e}"))),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}
