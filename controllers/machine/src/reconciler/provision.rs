//! Provisioning pipeline
//!
//! Steps run strictly in order and each one is idempotent:
//! 1. network prerequisites (amazonec2 only)
//! 2. startup script materialization
//! 3. auth material resolution
//! 4. `docker-machine create`
//!
//! A failing step aborts the rest. Conditions marked by earlier steps stay.

use super::{Reconciler, WorkingCopy};
use crate::ami::ami_for_region;
use crate::cloud::AWS_REGION_PARAMETER;
use crate::driver::{Driver, ScriptDelivery};
use crate::error::ControllerError;
use crate::secrets::first_entry;
use crds::{reasons, ConditionSeverity, ConditionType, Machine, ProvisioningProgress};
use kube::ResourceExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

const AMI_PARAMETER: &str = "amazonec2-ami";

impl Reconciler {
    /// Run the pipeline unless the machine already exists or is being created.
    pub(crate) async fn provision(&self, working: &mut WorkingCopy, driver: &Driver) -> Result<(), ControllerError> {
        let conditions = working.conditions();
        if conditions.is_true(ConditionType::MachineCreating) || conditions.is_true(ConditionType::MachineReady) {
            debug!(machine = %working.key(), "Machine created or being created, skipping provisioning");
            return Ok(());
        }

        let provider_args = if driver.requires_network() {
            let progress = self.ensure_aws_network(working).await?;
            aws_provider_args(&working.machine, &progress)
        } else {
            Vec::new()
        };
        let script_args = self.materialize_script(working, driver).await?;
        let auth_args = self.resolve_auth(working, driver).await?;

        let args = create_args(&working.machine, driver, script_args, auth_args, provider_args);
        self.create_machine(working, &args).await
    }

    /// Resolve the script secret and, for signal-file drivers, write the
    /// script to disk. Returns the script flag and path.
    async fn materialize_script(
        &self,
        working: &mut WorkingCopy,
        driver: &Driver,
    ) -> Result<Vec<String>, ControllerError> {
        let Some(script_ref) = working.machine.spec.script_ref.clone() else {
            return Ok(Vec::new());
        };
        let namespace = script_ref.namespace_or(working.namespace()).to_string();

        let data = self.secrets.get(&namespace, &script_ref.name).await?;
        let Some((key, body)) = data.as_ref().and_then(first_entry) else {
            working.conditions_mut().mark_false(
                ConditionType::ScriptReady,
                reasons::SCRIPT_DATA_NOT_FOUND,
                ConditionSeverity::Error,
                "script data not found",
            );
            return Err(ControllerError::SecretNotReady(format!(
                "script secret {namespace}/{} has no script",
                script_ref.name
            )));
        };

        let args = match driver.script_delivery() {
            ScriptDelivery::Job => Vec::new(),
            ScriptDelivery::SignalFile => {
                let path = self.script_path(working.namespace(), working.name());
                write_if_missing(&path, body).await?;
                vec![format!("--{key}"), path.display().to_string()]
            }
        };
        working.conditions_mut().mark_true(ConditionType::ScriptReady);
        Ok(args)
    }

    /// Turn every auth secret entry into a driver flag.
    async fn resolve_auth(&self, working: &mut WorkingCopy, driver: &Driver) -> Result<Vec<String>, ControllerError> {
        let auth = working.machine.spec.auth_secret.clone();
        let namespace = auth.namespace_or(working.namespace()).to_string();

        let data = self.secrets.get(&namespace, &auth.name).await?;
        let usable = data
            .filter(|d| !d.is_empty())
            .filter(|d| d.iter().all(|(k, v)| !k.is_empty() && !v.is_empty()));
        let Some(data) = usable else {
            working.conditions_mut().mark_false(
                ConditionType::AuthDataReady,
                reasons::AUTH_DATA_NOT_FOUND,
                ConditionSeverity::Error,
                "auth data not found",
            );
            return Err(ControllerError::SecretNotReady(format!(
                "auth secret {namespace}/{} is missing or incomplete",
                auth.name
            )));
        };

        let args = data
            .iter()
            .flat_map(|(key, value)| [format!("--{key}"), driver.encode_auth_value(value)])
            .collect();
        working.conditions_mut().mark_true(ConditionType::AuthDataReady);
        Ok(args)
    }

    /// Run `docker-machine create` and record the result.
    async fn create_machine(&self, working: &mut WorkingCopy, args: &[String]) -> Result<(), ControllerError> {
        working.conditions_mut().mark_true(ConditionType::MachineCreating);
        working.conditions_mut().mark_false(
            ConditionType::MachineReady,
            reasons::MACHINE_CREATING,
            ConditionSeverity::Info,
            "machine is being created",
        );
        self.flush_status(working).await?;

        info!(machine = %working.key(), driver = %working.machine.spec.driver.name, "Creating machine");
        let result = self
            .runner
            .run(args, self.config.machine_creation_timeout)
            .await
            .and_then(|output| {
                if output.success() || output.stderr.contains("already exists") {
                    Ok(())
                } else {
                    Err(ControllerError::CommandFailed(output.failure_message()))
                }
            });

        match result {
            Ok(()) => {
                info!(machine = %working.key(), "Machine created");
                working.conditions_mut().mark_true(ConditionType::MachineReady);
                Ok(())
            }
            Err(e) => {
                error!(machine = %working.key(), "Could not create machine: {}", e);
                let message = e.to_string();
                for type_ in [ConditionType::MachineReady, ConditionType::MachineCreating] {
                    working.conditions_mut().mark_false(
                        type_,
                        reasons::MACHINE_CREATION_FAILED,
                        ConditionSeverity::Error,
                        message.clone(),
                    );
                }
                Err(e)
            }
        }
    }
}

/// `create --driver <name> [params] [script] [auth] [provider] <name>`
pub(crate) fn create_args(
    machine: &Machine,
    driver: &Driver,
    script_args: Vec<String>,
    auth_args: Vec<String>,
    provider_args: Vec<String>,
) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--driver".to_string(), driver.name().to_string()];
    for (key, value) in &machine.spec.parameters {
        args.push(format!("--{key}"));
        args.push(value.clone());
    }
    args.extend(script_args);
    args.extend(auth_args);
    args.extend(provider_args);
    args.push(machine.name_any());
    args
}

/// VPC, subnet and default AMI flags for the amazonec2 driver.
pub(crate) fn aws_provider_args(machine: &Machine, progress: &ProvisioningProgress) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(vpc_id) = &progress.vpc_id {
        args.push("--amazonec2-vpc-id".to_string());
        args.push(vpc_id.clone());
    }
    if let Some(subnet_id) = &progress.subnet_id {
        args.push("--amazonec2-subnet-id".to_string());
        args.push(subnet_id.clone());
    }
    if machine.parameter(AMI_PARAMETER).is_none() {
        if let Some(ami) = machine.parameter(AWS_REGION_PARAMETER).and_then(ami_for_region) {
            args.push(format!("--{AMI_PARAMETER}"));
            args.push(ami.to_string());
        }
    }
    args
}

/// Create `path` with `body` unless it already exists.
///
/// The body is written to a sibling `.partial` file and renamed into place,
/// so `path` only ever holds a complete script.
async fn write_if_missing(path: &Path, body: &[u8]) -> Result<(), ControllerError> {
    if tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "Startup script already present");
        return Ok(());
    }
    let partial = partial_path(path);
    if let Err(e) = write_file(&partial, body).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(path = %partial.display(), "Failed to remove partial script: {}", cleanup);
            }
        }
        return Err(e.into());
    }
    tokio::fs::rename(&partial, path).await?;
    debug!(path = %path.display(), "Wrote startup script");
    Ok(())
}

async fn write_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);
    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

#[cfg(test)]
#[path = "provision_test.rs"]
mod provision_test;
