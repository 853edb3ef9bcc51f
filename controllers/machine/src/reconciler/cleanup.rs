//! Cleanup of a deleted Machine
//!
//! Order: local files, the docker-machine host, then whatever the driver
//! created besides the host. Any failure aborts cleanup and keeps the
//! finalizer in place.

use super::{Reconciler, WorkingCopy};
use crate::cloud::azure_credentials_from_secret;
use crate::driver::Driver;
use crate::error::ControllerError;
use crate::jobs::ScriptJobSpec;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

const AZURE_RESOURCE_GROUP_PARAMETER: &str = "azure-resource-group";
const DEFAULT_AZURE_RESOURCE_GROUP: &str = "docker-machine";

impl Reconciler {
    pub(crate) async fn cleanup(&self, working: &mut WorkingCopy) -> Result<(), ControllerError> {
        let driver = Driver::from_name(&working.machine.spec.driver.name);

        remove_if_present(&self.script_path(working.namespace(), working.name())).await?;
        remove_if_present(&self.result_path(working.namespace(), working.name())).await?;

        self.remove_host(working).await?;

        match driver {
            Driver::Aws => self.teardown_aws_network(working).await?,
            Driver::Azure => self.delete_resource_group(working).await?,
            Driver::Hetzner => self.delete_script_job(working).await?,
            Driver::Google | Driver::Other(_) => {}
        }
        info!(machine = %working.key(), "Machine resources cleaned up");
        Ok(())
    }

    /// `docker-machine rm -y <name>`, treating an unknown host as removed.
    async fn remove_host(&self, working: &WorkingCopy) -> Result<(), ControllerError> {
        let args = vec!["rm".to_string(), "-y".to_string(), working.name().to_string()];
        let output = self
            .runner
            .run(&args, self.config.machine_creation_timeout)
            .await?;
        if output.success() {
            info!(machine = %working.key(), "Removed docker-machine host");
            return Ok(());
        }
        if output.stderr.contains("not exist") {
            debug!(machine = %working.key(), "docker-machine host already removed");
            return Ok(());
        }
        Err(ControllerError::CommandFailed(output.failure_message()))
    }

    async fn delete_resource_group(&self, working: &WorkingCopy) -> Result<(), ControllerError> {
        let group = working
            .machine
            .parameter(AZURE_RESOURCE_GROUP_PARAMETER)
            .unwrap_or(DEFAULT_AZURE_RESOURCE_GROUP)
            .to_string();
        let auth = &working.machine.spec.auth_secret;
        let namespace = auth.namespace_or(working.namespace());
        let data = self.secrets.get(namespace, &auth.name).await?.ok_or_else(|| {
            ControllerError::SecretNotReady(format!("auth secret {namespace}/{} not found", auth.name))
        })?;

        let client = self
            .cloud
            .resource_groups(azure_credentials_from_secret(&data)?)?;
        match client.delete_resource_group(&group).await {
            Ok(()) => {
                info!(machine = %working.key(), resource_group = %group, "Deleted Azure resource group");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(machine = %working.key(), resource_group = %group, "Azure resource group already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_script_job(&self, working: &WorkingCopy) -> Result<(), ControllerError> {
        let Some(script_ref) = &working.machine.spec.script_ref else {
            return Ok(());
        };
        let namespace = script_ref.namespace_or(working.namespace());
        self.jobs
            .delete_job(namespace, &ScriptJobSpec::job_name_for(working.name()))
            .await
    }
}

async fn remove_if_present(path: &Path) -> Result<(), ControllerError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "cleanup_test.rs"]
mod cleanup_test;
