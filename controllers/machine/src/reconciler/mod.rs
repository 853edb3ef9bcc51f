//! Reconciliation logic for Machine resources.
//!
//! One reconcile walks a Machine through:
//! - `finalizer`: deletion guard, and cleanup once deletion is requested
//! - `provision`: network prerequisites, script, credentials, `docker-machine create`
//! - `aws`: the VPC/subnet/gateway graph for the amazonec2 driver
//! - `poller`: completion of the startup script
//! - `cleanup`: local files, `docker-machine rm` and provider teardown
//!
//! Status is recomputed and written back at the end of every reconcile,
//! whether it succeeded or not.

pub mod aws;
pub mod cleanup;
pub mod finalizer;
pub mod poller;
pub mod provision;

use crate::backoff::BackoffTracker;
use crate::cloud::CloudClients;
use crate::config::ControllerConfig;
use crate::driver::Driver;
use crate::error::ControllerError;
use crate::executor::CommandRunner;
use crate::jobs::ScriptJobs;
use crate::secrets::SecretStore;
use crate::store::MachineStore;
use crds::{Conditions, Machine, MachineStatus};
use kube::ResourceExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the watch loop should do after a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the Machine changes
    AwaitChange,
    /// Check again after the delay (startup script still running)
    RequeueAfter(Duration),
}

/// In-memory Machine being reconciled, plus the status last written for it.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    pub machine: Machine,
    namespace: String,
    name: String,
    persisted: Option<MachineStatus>,
}

impl WorkingCopy {
    pub fn new(machine: Machine) -> Self {
        Self {
            namespace: machine.namespace_or_default(),
            name: machine.name_any(),
            persisted: machine.status.clone(),
            machine,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn conditions(&self) -> Conditions {
        self.machine.conditions()
    }

    pub fn conditions_mut(&mut self) -> &mut Conditions {
        self.machine.conditions_mut()
    }
}

/// Reconciles Machine resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn MachineStore>,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) jobs: Arc<dyn ScriptJobs>,
    pub(crate) cloud: Arc<dyn CloudClients>,
    pub(crate) config: ControllerConfig,
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    pub fn new(
        store: Arc<dyn MachineStore>,
        secrets: Arc<dyn SecretStore>,
        runner: Arc<dyn CommandRunner>,
        jobs: Arc<dyn ScriptJobs>,
        cloud: Arc<dyn CloudClients>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            secrets,
            runner,
            jobs,
            cloud,
            config,
            backoff: BackoffTracker::new(),
        }
    }

    /// Reconcile the Machine a watch event was delivered for.
    ///
    /// Resets the Machine's backoff on success.
    pub async fn reconcile_machine(&self, machine: &Machine) -> Result<ReconcileOutcome, ControllerError> {
        let key = machine.key();
        let outcome = self
            .reconcile(&machine.namespace_or_default(), &machine.name_any())
            .await?;
        self.backoff.reset(&key);
        Ok(outcome)
    }

    /// Delay before retrying a failed reconcile of `machine`.
    pub fn backoff_for(&self, machine: &Machine, error: &ControllerError) -> Duration {
        let key = machine.key();
        let (delay, attempts) = self.backoff.record_failure(&key);
        if error.is_not_ready() {
            info!(machine = %key, attempts, retry_in_secs = delay.as_secs(), "Machine not ready: {}", error);
        } else if error.is_configuration() {
            warn!(machine = %key, attempts, retry_in_secs = delay.as_secs(), "Machine spec needs fixing: {}", error);
        } else {
            warn!(machine = %key, attempts, retry_in_secs = delay.as_secs(), "Machine reconcile failed: {}", error);
        }
        delay
    }

    /// Reconcile one Machine by identity.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let Some(machine) = self.store.get(namespace, name).await? else {
            debug!(namespace = %namespace, name = %name, "Machine no longer exists");
            return Ok(ReconcileOutcome::AwaitChange);
        };

        if machine.is_deleting() {
            self.finalize(machine).await?;
            return Ok(ReconcileOutcome::AwaitChange);
        }

        let machine = self.ensure_finalizer(machine).await?;
        let driver = Driver::from_name(&machine.spec.driver.name);
        let mut working = WorkingCopy::new(machine);

        let result = self.drive(&mut working, &driver).await;
        let flushed = self.flush_status(&mut working).await;
        match (result, flushed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(flush_err)) => {
                warn!(machine = %working.key(), "Failed to write status after error: {}", flush_err);
                Err(e)
            }
        }
    }

    async fn drive(&self, working: &mut WorkingCopy, driver: &Driver) -> Result<ReconcileOutcome, ControllerError> {
        self.provision(working, driver).await?;
        Ok(match self.poll_completion(working, driver).await? {
            Some(delay) => ReconcileOutcome::RequeueAfter(delay),
            None => ReconcileOutcome::AwaitChange,
        })
    }

    /// Write the recomputed status if it differs from the last one written.
    pub(crate) async fn flush_status(&self, working: &mut WorkingCopy) -> Result<(), ControllerError> {
        let status = working.machine.computed_status();
        if working.persisted.as_ref() == Some(&status) {
            return Ok(());
        }
        debug!(machine = %working.key(), phase = %status.phase, "Updating Machine status");
        self.store
            .patch_status(working.namespace(), working.name(), &status)
            .await?;
        working.machine.status = Some(status.clone());
        working.persisted = Some(status);
        Ok(())
    }

    /// `<scriptDir>/<namespace>-<name>-startup.sh`
    pub(crate) fn script_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.config
            .script_directory
            .join(format!("{namespace}-{name}-startup.sh"))
    }

    /// `<scriptDir>/<namespace>-<name>-result.txt`
    pub(crate) fn result_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.config
            .script_directory
            .join(format!("{namespace}-{name}-result.txt"))
    }
}
