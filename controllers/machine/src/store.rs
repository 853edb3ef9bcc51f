//! Persisted Machine state
//!
//! The reconciler never writes the whole object. Finalizers, annotations and
//! status are each changed with a narrow merge patch.

use crate::error::ControllerError;
use crds::{Machine, MachineStatus, ProvisioningProgress};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Read and patch access to Machine resources.
#[async_trait::async_trait]
pub trait MachineStore: Send + Sync {
    /// Fetch the current object, `None` if it no longer exists.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError>;

    /// Replace the finalizer list, failing if the object changed since
    /// `resource_version` was read.
    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<Machine, ControllerError>;

    /// Write the recorded AWS identifiers, removing cleared ones.
    async fn patch_annotations(
        &self,
        namespace: &str,
        name: &str,
        progress: &ProvisioningProgress,
    ) -> Result<(), ControllerError>;

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineStatus,
    ) -> Result<(), ControllerError>;
}

/// [`MachineStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeMachineStore {
    client: Client,
}

impl std::fmt::Debug for KubeMachineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeMachineStore").finish_non_exhaustive()
    }
}

impl KubeMachineStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Machine> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl MachineStore for KubeMachineStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<Machine, ControllerError> {
        // resourceVersion in a merge patch makes the API server reject the
        // write with 409 if the object moved on
        let patch = json!({
            "metadata": {
                "resourceVersion": resource_version,
                "finalizers": finalizers,
            }
        });
        debug!(namespace = %namespace, name = %name, ?finalizers, "Patching Machine finalizers");
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(machine) => Ok(machine),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Err(ControllerError::Conflict(format!(
                "machine {namespace}/{name} changed since {}: {}",
                resource_version.unwrap_or("read"),
                api_err.message
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_annotations(
        &self,
        namespace: &str,
        name: &str,
        progress: &ProvisioningProgress,
    ) -> Result<(), ControllerError> {
        let patch = progress.annotations_patch();
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineStatus,
    ) -> Result<(), ControllerError> {
        let patch = json!({ "status": status });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
