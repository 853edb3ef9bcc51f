//! Startup script Jobs
//!
//! Drivers without a way to hand a script to docker-machine run it from the
//! cluster instead: a one-shot Job mounts the script secret and executes the
//! script key.

use crate::error::ControllerError;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams, PropagationPolicy};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info};

const SCRIPT_IMAGE: &str = "debian:12";
const SCRIPT_CONTAINER: &str = "capi-script";
const SCRIPT_VOLUME: &str = "script";
const SCRIPT_MOUNT_PATH: &str = "/etc/capi-script";
const SCRIPT_FILE_MODE: i32 = 0o755;
const MACHINE_LABEL: &str = "docker-machine.klusters.dev/machine";

/// What a startup script Job needs to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptJobSpec {
    /// Namespace of both the Job and the script secret
    pub namespace: String,
    pub job_name: String,
    pub machine_name: String,
    pub secret_name: String,
    /// Secret key holding the script, executed from the mount path
    pub script_key: String,
}

impl ScriptJobSpec {
    /// Job name for a Machine
    pub fn job_name_for(machine_name: &str) -> String {
        format!("{machine_name}-startup-script")
    }
}

/// Observed state of a script Job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Running,
    Succeeded,
    Failed,
}

#[async_trait::async_trait]
pub trait ScriptJobs: Send + Sync {
    /// Create the Job unless it already exists.
    async fn ensure_job(&self, spec: &ScriptJobSpec) -> Result<(), ControllerError>;

    /// Current outcome, `None` if the Job does not exist.
    async fn job_outcome(&self, namespace: &str, name: &str) -> Result<Option<JobOutcome>, ControllerError>;

    /// Delete the Job and its pods. A missing Job is not an error.
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;
}

/// Build the Job object for `spec`.
pub fn build_job(spec: &ScriptJobSpec) -> Job {
    let labels = BTreeMap::from([
        ("app.kubernetes.io/managed-by".to_string(), "machine-controller".to_string()),
        (MACHINE_LABEL.to_string(), spec.machine_name.clone()),
    ]);
    Job {
        metadata: ObjectMeta {
            name: Some(spec.job_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: SCRIPT_CONTAINER.to_string(),
                        image: Some(SCRIPT_IMAGE.to_string()),
                        command: Some(vec![format!("{SCRIPT_MOUNT_PATH}/{}", spec.script_key)]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: SCRIPT_VOLUME.to_string(),
                            mount_path: SCRIPT_MOUNT_PATH.to_string(),
                            read_only: Some(true),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: SCRIPT_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(spec.secret_name.clone()),
                            default_mode: Some(SCRIPT_FILE_MODE),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Outcome from a Job's status counters.
pub fn job_outcome(job: &Job) -> JobOutcome {
    let status = job.status.as_ref();
    if status.and_then(|s| s.succeeded).unwrap_or(0) > 0 {
        JobOutcome::Succeeded
    } else if status.and_then(|s| s.failed).unwrap_or(0) > 0 {
        JobOutcome::Failed
    } else {
        JobOutcome::Running
    }
}

/// [`ScriptJobs`] backed by the Kubernetes batch API
#[derive(Clone)]
pub struct KubeScriptJobs {
    client: Client,
}

impl std::fmt::Debug for KubeScriptJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeScriptJobs").finish_non_exhaustive()
    }
}

impl KubeScriptJobs {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ScriptJobs for KubeScriptJobs {
    async fn ensure_job(&self, spec: &ScriptJobSpec) -> Result<(), ControllerError> {
        let job = build_job(spec);
        match self.api(&spec.namespace).create(&PostParams::default(), &job).await {
            Ok(_) => {
                info!(namespace = %spec.namespace, job = %spec.job_name, "Created startup script Job");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                debug!(namespace = %spec.namespace, job = %spec.job_name, "Startup script Job already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn job_outcome(&self, namespace: &str, name: &str) -> Result<Option<JobOutcome>, ControllerError> {
        let job = self.api(namespace).get_opt(name).await?;
        Ok(job.as_ref().map(job_outcome))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match self.api(namespace).delete(name, &params).await {
            Ok(_) => {
                info!(namespace = %namespace, job = %name, "Deleted startup script Job");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(namespace = %namespace, job = %name, "Startup script Job already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
