//! AWS network prerequisites
//!
//! Builds VPC -> subnet -> internet gateway -> default route for the
//! amazonec2 driver. Each identifier is written to the Machine's annotations
//! as soon as the object exists, so a retried reconcile resumes instead of
//! creating duplicates. The route table is recorded last and marks the
//! gateway as wired. Teardown walks the chain backwards and clears each
//! annotation once its object is gone.

use super::{Reconciler, WorkingCopy};
use crate::cloud::{AwsCredentials, AWS_REGION_PARAMETER};
use crate::error::ControllerError;
use crds::ProvisioningProgress;
use ec2_client::{Ec2Error, Ec2NetworkClientTrait, VPC_STATE_AVAILABLE};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const VPC_CIDR: &str = "10.1.0.0/16";
pub const SUBNET_CIDR: &str = "10.1.0.0/16";
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";
const ZONE_PARAMETER: &str = "amazonec2-zone";
const DEFAULT_ZONE: &str = "a";

impl Reconciler {
    /// Make sure the VPC, subnet and gateway exist and the gateway is routed.
    /// Returns the full record.
    pub(crate) async fn ensure_aws_network(
        &self,
        working: &mut WorkingCopy,
    ) -> Result<ProvisioningProgress, ControllerError> {
        let mut progress = ProvisioningProgress::from_machine(&working.machine);
        if progress.is_complete() {
            debug!(machine = %working.key(), "AWS network already provisioned");
            return Ok(progress);
        }

        let credentials = self.aws_credentials(working).await?;
        let ec2 = self.cloud.ec2(&credentials).await;

        let vpc_id = match progress.vpc_id.clone() {
            Some(vpc_id) => vpc_id,
            None => {
                let vpc_id = ec2.create_vpc(VPC_CIDR).await?;
                progress.vpc_id = Some(vpc_id.clone());
                self.record_progress(working, &progress).await?;
                vpc_id
            }
        };

        if progress.subnet_id.is_none() {
            match self.wait_for_vpc(ec2.as_ref(), &vpc_id).await {
                Ok(()) => {}
                Err(e @ ControllerError::Ec2(Ec2Error::Timeout { .. })) => {
                    return Err(self.discard_vpc(working, &mut progress, ec2.as_ref(), e).await);
                }
                Err(e) => return Err(e),
            }
            let zone = format!(
                "{}{}",
                credentials.region,
                working.machine.parameter(ZONE_PARAMETER).unwrap_or(DEFAULT_ZONE)
            );
            let subnet_id = ec2.create_subnet(&vpc_id, SUBNET_CIDR, &zone).await?;
            progress.subnet_id = Some(subnet_id);
            self.record_progress(working, &progress).await?;
        }

        let gateway_id = match progress.gateway_id.clone() {
            Some(gateway_id) => gateway_id,
            None => {
                let gateway_id = ec2.create_internet_gateway().await?;
                progress.gateway_id = Some(gateway_id.clone());
                self.record_progress(working, &progress).await?;
                gateway_id
            }
        };

        // a recorded gateway may have been left unwired by an earlier attempt
        if progress.route_table_id.is_none() {
            match connect_gateway(ec2.as_ref(), &gateway_id, &vpc_id).await {
                Ok(route_table_id) => {
                    progress.route_table_id = Some(route_table_id);
                    self.record_progress(working, &progress).await?;
                }
                Err(e) => return Err(self.discard_gateway(working, &mut progress, ec2.as_ref(), e).await),
            }
        }

        info!(machine = %working.key(), vpc_id = %vpc_id, "AWS network ready");
        Ok(progress)
    }

    /// Delete the recorded network graph in reverse dependency order.
    ///
    /// Objects that are already gone count as deleted. Any other failure
    /// stops the teardown with the remaining identifiers still recorded.
    pub(crate) async fn teardown_aws_network(&self, working: &mut WorkingCopy) -> Result<(), ControllerError> {
        let mut progress = ProvisioningProgress::from_machine(&working.machine);
        if progress.is_empty() {
            return Ok(());
        }

        let credentials = self.aws_credentials(working).await?;
        let ec2 = self.cloud.ec2(&credentials).await;
        info!(machine = %working.key(), ?progress, "Tearing down AWS network");

        if let Some(gateway_id) = progress.gateway_id.clone() {
            if let Some(vpc_id) = progress.vpc_id.as_deref() {
                let route_table = match progress.route_table_id.clone() {
                    Some(route_table) => Ok(route_table),
                    None => ec2.main_route_table(vpc_id).await,
                };
                match route_table {
                    Ok(route_table) => {
                        tolerate_missing(ec2.delete_route(&route_table, DEFAULT_ROUTE).await, "default route")?;
                    }
                    Err(e) => tolerate_missing(Err(e), "main route table")?,
                }
                tolerate_missing(
                    ec2.detach_internet_gateway(&gateway_id, vpc_id).await,
                    "internet gateway attachment",
                )?;
            }
            tolerate_missing(ec2.delete_internet_gateway(&gateway_id).await, &gateway_id)?;
            progress.gateway_id = None;
            progress.route_table_id = None;
            self.record_progress(working, &progress).await?;
        }

        if let Some(subnet_id) = progress.subnet_id.clone() {
            tolerate_missing(ec2.delete_subnet(&subnet_id).await, &subnet_id)?;
            progress.subnet_id = None;
            self.record_progress(working, &progress).await?;
        }

        if let Some(vpc_id) = progress.vpc_id.clone() {
            let groups = match ec2.list_security_groups(&vpc_id).await {
                Ok(groups) => groups,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            for group in groups.iter().filter(|g| !g.is_default()) {
                tolerate_missing(ec2.delete_security_group(&group.group_id).await, &group.group_id)?;
            }
            tolerate_missing(ec2.delete_vpc(&vpc_id).await, &vpc_id)?;
            progress.vpc_id = None;
            self.record_progress(working, &progress).await?;
        }

        info!(machine = %working.key(), "AWS network removed");
        Ok(())
    }

    /// Region from the Machine parameters, keys from its auth secret.
    async fn aws_credentials(&self, working: &WorkingCopy) -> Result<AwsCredentials, ControllerError> {
        let region = working
            .machine
            .parameter(AWS_REGION_PARAMETER)
            .ok_or_else(|| ControllerError::MissingParameter(AWS_REGION_PARAMETER.to_string()))?
            .to_string();
        let auth = &working.machine.spec.auth_secret;
        let namespace = auth.namespace_or(working.namespace());
        let data = self.secrets.get(namespace, &auth.name).await?.ok_or_else(|| {
            ControllerError::SecretNotReady(format!("auth secret {namespace}/{} not found", auth.name))
        })?;
        AwsCredentials::from_secret(&region, &data)
    }

    /// Poll until the VPC reports `available`.
    async fn wait_for_vpc(&self, ec2: &dyn Ec2NetworkClientTrait, vpc_id: &str) -> Result<(), ControllerError> {
        let deadline = Instant::now() + self.config.vpc_poll_timeout;
        loop {
            let state = ec2.vpc_state(vpc_id).await?;
            if state.as_deref() == Some(VPC_STATE_AVAILABLE) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Ec2Error::Timeout {
                    resource: vpc_id.to_string(),
                    state: VPC_STATE_AVAILABLE,
                }
                .into());
            }
            debug!(vpc_id = %vpc_id, ?state, "Waiting for VPC");
            tokio::time::sleep(self.config.vpc_poll_interval).await;
        }
    }

    /// Delete a VPC that never became usable and forget it.
    async fn discard_vpc(
        &self,
        working: &mut WorkingCopy,
        progress: &mut ProvisioningProgress,
        ec2: &dyn Ec2NetworkClientTrait,
        cause: ControllerError,
    ) -> ControllerError {
        let Some(vpc_id) = progress.vpc_id.clone() else {
            return cause;
        };
        warn!(machine = %working.key(), vpc_id = %vpc_id, "Deleting unusable VPC: {}", cause);
        if let Err(e) = ec2.delete_vpc(&vpc_id).await {
            if !e.is_not_found() {
                return ControllerError::compensated(cause, e);
            }
        }
        progress.vpc_id = None;
        if let Err(e) = self.record_progress(working, progress).await {
            return ControllerError::compensated(cause, e);
        }
        network_unavailable(cause)
    }

    /// Remove a gateway that could not be wired into the VPC and forget it.
    async fn discard_gateway(
        &self,
        working: &mut WorkingCopy,
        progress: &mut ProvisioningProgress,
        ec2: &dyn Ec2NetworkClientTrait,
        cause: ControllerError,
    ) -> ControllerError {
        let (Some(gateway_id), Some(vpc_id)) = (progress.gateway_id.clone(), progress.vpc_id.clone()) else {
            return cause;
        };
        warn!(machine = %working.key(), gateway_id = %gateway_id, "Deleting internet gateway: {}", cause);
        if let Err(e) = ec2.detach_internet_gateway(&gateway_id, &vpc_id).await {
            if !e.is_not_found() {
                return ControllerError::compensated(cause, e);
            }
        }
        if let Err(e) = ec2.delete_internet_gateway(&gateway_id).await {
            if !e.is_not_found() {
                return ControllerError::compensated(cause, e);
            }
        }
        progress.gateway_id = None;
        progress.route_table_id = None;
        if let Err(e) = self.record_progress(working, progress).await {
            return ControllerError::compensated(cause, e);
        }
        cause
    }

    /// Persist the record and mirror it on the working copy.
    pub(crate) async fn record_progress(
        &self,
        working: &mut WorkingCopy,
        progress: &ProvisioningProgress,
    ) -> Result<(), ControllerError> {
        self.store
            .patch_annotations(working.namespace(), working.name(), progress)
            .await?;
        progress.apply_to(
            working
                .machine
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new),
        );
        Ok(())
    }
}

/// Attach the gateway and route all traffic through it. Returns the route
/// table holding the default route.
///
/// Both steps accept an attachment or route left by an earlier attempt.
async fn connect_gateway(
    ec2: &dyn Ec2NetworkClientTrait,
    gateway_id: &str,
    vpc_id: &str,
) -> Result<String, ControllerError> {
    tolerate_existing(
        ec2.attach_internet_gateway(gateway_id, vpc_id).await,
        "internet gateway attachment",
    )?;
    let route_table = ec2.main_route_table(vpc_id).await?;
    tolerate_existing(
        ec2.create_route(&route_table, DEFAULT_ROUTE, gateway_id).await,
        "default route",
    )?;
    Ok(route_table)
}

fn network_unavailable(cause: ControllerError) -> ControllerError {
    match cause {
        ControllerError::Ec2(Ec2Error::Timeout { resource, state }) => {
            ControllerError::NetworkNotAvailable(format!("{resource} did not become {state}"))
        }
        other => other,
    }
}

/// Treat "does not exist" as success during teardown.
fn tolerate_missing(result: Result<(), Ec2Error>, what: &str) -> Result<(), ControllerError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            warn!("{} already gone: {}", what, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn tolerate_existing(result: Result<(), Ec2Error>, what: &str) -> Result<(), ControllerError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!("{} already in place: {}", what, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "aws_test.rs"]
mod aws_test;
