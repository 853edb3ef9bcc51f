//! Test utilities for unit testing the reconciler
//!
//! In-memory stand-ins for the Kubernetes API, the docker-machine binary and
//! the cloud clients, plus helpers for building Machines.

use crate::cloud::{AwsCredentials, CloudClients};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::executor::{CommandOutput, CommandRunner};
use crate::jobs::{JobOutcome, ScriptJobSpec, ScriptJobs};
use crate::reconciler::Reconciler;
use crate::secrets::{SecretData, SecretStore};
use crate::store::MachineStore;
use azure_client::{AzureCredentials, MockResourceGroupClient, ResourceGroupClientTrait};
use crds::*;
use ec2_client::{Ec2NetworkClientTrait, MockEc2Client};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const NAMESPACE: &str = "machines";

/// Helper to create a test Machine
pub fn create_test_machine(name: &str, driver: &str) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: MachineSpec {
            driver: DriverRef {
                name: driver.to_string(),
            },
            script_ref: None,
            auth_secret: SecretRef {
                name: format!("{name}-auth"),
                namespace: None,
            },
            parameters: BTreeMap::new(),
        },
        status: None,
    }
}

/// Helper to add a script reference named `<name>-script`
pub fn with_script(mut machine: Machine) -> Machine {
    let name = machine.metadata.name.clone().unwrap_or_default();
    machine.spec.script_ref = Some(SecretRef {
        name: format!("{name}-script"),
        namespace: None,
    });
    machine
}

pub fn with_parameter(mut machine: Machine, key: &str, value: &str) -> Machine {
    machine
        .spec
        .parameters
        .insert(key.to_string(), value.to_string());
    machine
}

pub fn with_finalizer(mut machine: Machine) -> Machine {
    machine
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    machine
}

pub fn marked_for_deletion(mut machine: Machine) -> Machine {
    let requested: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap();
    machine.metadata.deletion_timestamp = Some(requested);
    machine
}

pub fn with_progress(mut machine: Machine, progress: &ProvisioningProgress) -> Machine {
    progress.apply_to(machine.metadata.annotations.get_or_insert_with(BTreeMap::new));
    machine
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// In-memory Machine store with a patch log
#[derive(Debug, Default)]
pub struct FakeMachineStore {
    machines: Mutex<HashMap<String, Machine>>,
    next_version: Mutex<u64>,
    status_patches: Mutex<Vec<MachineStatus>>,
    annotation_patches: Mutex<Vec<ProvisioningProgress>>,
    finalizer_patches: Mutex<Vec<(Option<String>, Vec<String>)>>,
    write_before_finalizer_patch: Mutex<bool>,
}

impl FakeMachineStore {
    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    pub fn insert(&self, machine: Machine) {
        lock(&self.machines).insert(machine.key(), machine);
    }

    pub fn machine(&self, name: &str) -> Option<Machine> {
        lock(&self.machines).get(&Self::key(NAMESPACE, name)).cloned()
    }

    pub fn status(&self, name: &str) -> MachineStatus {
        self.machine(name)
            .and_then(|m| m.status)
            .unwrap_or_default()
    }

    pub fn progress(&self, name: &str) -> ProvisioningProgress {
        self.machine(name)
            .map(|m| ProvisioningProgress::from_machine(&m))
            .unwrap_or_default()
    }

    pub fn status_patch_count(&self) -> usize {
        lock(&self.status_patches).len()
    }

    pub fn status_patches(&self) -> Vec<MachineStatus> {
        lock(&self.status_patches).clone()
    }

    pub fn annotation_patches(&self) -> Vec<ProvisioningProgress> {
        lock(&self.annotation_patches).clone()
    }

    pub fn finalizer_patches(&self) -> Vec<(Option<String>, Vec<String>)> {
        lock(&self.finalizer_patches).clone()
    }

    /// Have another writer update the stored Machine just before the next
    /// finalizer patch arrives
    pub fn write_before_next_finalizer_patch(&self) {
        *lock(&self.write_before_finalizer_patch) = true;
    }

    fn bump(&self, machine: &mut Machine) {
        let mut version = lock(&self.next_version);
        *version += 1;
        machine.metadata.resource_version = Some(format!("v{version}"));
    }

    fn modify<R>(&self, namespace: &str, name: &str, f: impl FnOnce(&mut Machine) -> R) -> Result<R, ControllerError> {
        let mut machines = lock(&self.machines);
        let machine = machines
            .get_mut(&Self::key(namespace, name))
            .ok_or_else(|| ControllerError::InvalidConfig(format!("machine {namespace}/{name} not stored")))?;
        let result = f(machine);
        self.bump(machine);
        Ok(result)
    }
}

#[async_trait::async_trait]
impl MachineStore for FakeMachineStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Machine>, ControllerError> {
        Ok(lock(&self.machines).get(&Self::key(namespace, name)).cloned())
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<Machine, ControllerError> {
        lock(&self.finalizer_patches).push((resource_version.map(str::to_string), finalizers.to_vec()));
        if std::mem::take(&mut *lock(&self.write_before_finalizer_patch)) {
            self.modify(namespace, name, |_| ())?;
        }
        let stored_version = lock(&self.machines)
            .get(&Self::key(namespace, name))
            .and_then(|m| m.metadata.resource_version.clone());
        if let Some(expected) = resource_version {
            if stored_version.as_deref() != Some(expected) {
                return Err(ControllerError::Conflict(format!(
                    "machine {namespace}/{name} is at {stored_version:?}, patch expected {expected}"
                )));
            }
        }
        let updated = self.modify(namespace, name, |m| {
            m.metadata.finalizers = Some(finalizers.to_vec());
            m.clone()
        })?;
        // the API server drops deleting objects once the last finalizer is gone
        if updated.is_deleting() && finalizers.is_empty() {
            lock(&self.machines).remove(&Self::key(namespace, name));
        }
        Ok(updated)
    }

    async fn patch_annotations(
        &self,
        namespace: &str,
        name: &str,
        progress: &ProvisioningProgress,
    ) -> Result<(), ControllerError> {
        lock(&self.annotation_patches).push(progress.clone());
        self.modify(namespace, name, |m| {
            progress.apply_to(m.metadata.annotations.get_or_insert_with(BTreeMap::new));
        })
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineStatus,
    ) -> Result<(), ControllerError> {
        lock(&self.status_patches).push(status.clone());
        self.modify(namespace, name, |m| m.status = Some(status.clone()))
    }
}

/// In-memory secrets
#[derive(Debug, Default)]
pub struct FakeSecretStore {
    secrets: Mutex<HashMap<String, SecretData>>,
}

impl FakeSecretStore {
    pub fn insert(&self, name: &str, entries: &[(&str, &str)]) {
        let data = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        lock(&self.secrets).insert(format!("{NAMESPACE}/{name}"), data);
    }

    pub fn remove(&self, name: &str) {
        lock(&self.secrets).remove(&format!("{NAMESPACE}/{name}"));
    }
}

#[async_trait::async_trait]
impl SecretStore for FakeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError> {
        Ok(lock(&self.secrets).get(&format!("{namespace}/{name}")).cloned())
    }
}

/// Scripted docker-machine
///
/// Commands succeed unless a failure is configured for their subcommand.
/// `scp` copies the configured remote result to the requested local path.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    failures: Mutex<HashMap<String, CommandOutput>>,
    remote_result: Mutex<Option<String>>,
}

impl FakeRunner {
    /// Make every `subcommand` exit with `exit_code` and `stderr`
    pub fn fail(&self, subcommand: &str, exit_code: i32, stderr: &str) {
        lock(&self.failures).insert(
            subcommand.to_string(),
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    pub fn succeed(&self, subcommand: &str) {
        lock(&self.failures).remove(subcommand);
    }

    /// Contents of `/tmp/result.txt` on the host, `None` while absent
    pub fn set_remote_result(&self, contents: Option<&str>) {
        *lock(&self.remote_result) = contents.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait::async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, args: &[String], _timeout: Duration) -> Result<CommandOutput, ControllerError> {
        lock(&self.calls).push(args.to_vec());
        let subcommand = args.first().cloned().unwrap_or_default();
        if let Some(output) = lock(&self.failures).get(&subcommand) {
            return Ok(output.clone());
        }
        if subcommand == "scp" {
            let Some(contents) = lock(&self.remote_result).clone() else {
                return Ok(CommandOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "scp: /tmp/result.txt: No such file or directory".to_string(),
                });
            };
            std::fs::write(Path::new(&args[2]), contents)?;
        }
        Ok(CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

/// In-memory script Jobs
#[derive(Debug, Default)]
pub struct FakeScriptJobs {
    jobs: Mutex<HashMap<String, (ScriptJobSpec, JobOutcome)>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeScriptJobs {
    pub fn job(&self, name: &str) -> Option<(ScriptJobSpec, JobOutcome)> {
        lock(&self.jobs).get(&format!("{NAMESPACE}/{name}")).cloned()
    }

    pub fn set_outcome(&self, name: &str, outcome: JobOutcome) {
        if let Some(job) = lock(&self.jobs).get_mut(&format!("{NAMESPACE}/{name}")) {
            job.1 = outcome;
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }
}

#[async_trait::async_trait]
impl ScriptJobs for FakeScriptJobs {
    async fn ensure_job(&self, spec: &ScriptJobSpec) -> Result<(), ControllerError> {
        lock(&self.jobs)
            .entry(format!("{}/{}", spec.namespace, spec.job_name))
            .or_insert_with(|| (spec.clone(), JobOutcome::Running));
        Ok(())
    }

    async fn job_outcome(&self, namespace: &str, name: &str) -> Result<Option<JobOutcome>, ControllerError> {
        Ok(lock(&self.jobs).get(&format!("{namespace}/{name}")).map(|(_, o)| *o))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let key = format!("{namespace}/{name}");
        lock(&self.jobs).remove(&key);
        lock(&self.deleted).push(key);
        Ok(())
    }
}

/// Cloud factory handing out the shared mocks
#[derive(Debug)]
pub struct FakeCloud {
    pub ec2: MockEc2Client,
    pub azure: MockResourceGroupClient,
    aws_credentials: Mutex<Vec<AwsCredentials>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            ec2: MockEc2Client::new("us-east-1"),
            azure: MockResourceGroupClient::new(),
            aws_credentials: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCloud {
    pub fn aws_credentials(&self) -> Vec<AwsCredentials> {
        lock(&self.aws_credentials).clone()
    }
}

#[async_trait::async_trait]
impl CloudClients for FakeCloud {
    async fn ec2(&self, credentials: &AwsCredentials) -> Arc<dyn Ec2NetworkClientTrait> {
        lock(&self.aws_credentials).push(credentials.clone());
        Arc::new(self.ec2.clone())
    }

    fn resource_groups(
        &self,
        credentials: AzureCredentials,
    ) -> Result<Arc<dyn ResourceGroupClientTrait>, ControllerError> {
        credentials.validate()?;
        Ok(Arc::new(self.azure.clone()))
    }
}

/// Reconciler wired to in-memory collaborators
pub struct TestHarness {
    pub store: Arc<FakeMachineStore>,
    pub secrets: Arc<FakeSecretStore>,
    pub runner: Arc<FakeRunner>,
    pub jobs: Arc<FakeScriptJobs>,
    pub cloud: Arc<FakeCloud>,
    pub reconciler: Reconciler,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ControllerConfig {
            script_directory: dir.path().to_path_buf(),
            vpc_poll_interval: Duration::ZERO,
            vpc_poll_timeout: Duration::ZERO,
            ..ControllerConfig::default()
        };
        let store = Arc::new(FakeMachineStore::default());
        let secrets = Arc::new(FakeSecretStore::default());
        let runner = Arc::new(FakeRunner::default());
        let jobs = Arc::new(FakeScriptJobs::default());
        let cloud = Arc::new(FakeCloud::default());
        let reconciler = Reconciler::new(
            store.clone(),
            secrets.clone(),
            runner.clone(),
            jobs.clone(),
            cloud.clone(),
            config,
        );
        Self {
            store,
            secrets,
            runner,
            jobs,
            cloud,
            reconciler,
            dir,
        }
    }

    /// Store `machine` and the secrets a happy-path reconcile needs.
    pub fn add_machine(&self, machine: Machine) {
        let name = machine.metadata.name.clone().unwrap_or_default();
        match machine.spec.driver.name.as_str() {
            "amazonec2" => self.secrets.insert(
                &format!("{name}-auth"),
                &[("amazonec2-access-key", "AKIATEST"), ("amazonec2-secret-key", "secret")],
            ),
            "azure" => self.secrets.insert(
                &format!("{name}-auth"),
                &[
                    ("azure-client-id", "client"),
                    ("azure-client-secret", "secret"),
                    ("azure-subscription-id", "sub"),
                    ("azure-tenant-id", "tenant"),
                ],
            ),
            _ => self.secrets.insert(&format!("{name}-auth"), &[("google-auth", "{\"type\":\"sa\"}")]),
        }
        if machine.spec.script_ref.is_some() {
            self.secrets
                .insert(&format!("{name}-script"), &[("userdata", "#!/bin/sh\necho 0 > /tmp/result.txt\n")]);
        }
        self.store.insert(machine);
    }

    pub async fn reconcile(&self, name: &str) -> Result<crate::reconciler::ReconcileOutcome, ControllerError> {
        self.reconciler.reconcile(NAMESPACE, name).await
    }

    pub fn conditions(&self, name: &str) -> Conditions {
        self.store.status(name).conditions
    }

    pub fn script_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{NAMESPACE}-{name}-startup.sh"))
    }

    pub fn result_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{NAMESPACE}-{name}-result.txt"))
    }
}
