//! Startup script completion
//!
//! Once the machine exists its startup script runs asynchronously. Hosts
//! created with the script signal completion by writing an exit code to
//! `/tmp/result.txt`; Job-based drivers report through the Job status. Each
//! reconcile performs a single check and asks to be requeued while the
//! script is still running.

use super::{Reconciler, WorkingCopy};
use crate::driver::{Driver, ScriptDelivery};
use crate::error::ControllerError;
use crate::jobs::{JobOutcome, ScriptJobSpec};
use crate::secrets::first_entry;
use crds::{reasons, ConditionSeverity, ConditionType};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the startup script leaves its exit code on the host
const REMOTE_RESULT_PATH: &str = "/tmp/result.txt";

impl Reconciler {
    /// Check script completion. Returns the requeue delay while waiting.
    pub(crate) async fn poll_completion(
        &self,
        working: &mut WorkingCopy,
        driver: &Driver,
    ) -> Result<Option<Duration>, ControllerError> {
        if working.machine.spec.script_ref.is_none() {
            return Ok(None);
        }
        let conditions = working.conditions();
        if !conditions.is_true(ConditionType::MachineReady) {
            return Ok(None);
        }
        if conditions.is_true(ConditionType::ClusterOperationComplete)
            || conditions.is_false_with(
                ConditionType::ClusterOperationComplete,
                reasons::CLUSTER_OPERATION_FAILED,
            )
        {
            return Ok(None);
        }

        match driver.script_delivery() {
            ScriptDelivery::SignalFile => self.poll_signal_file(working, driver).await,
            ScriptDelivery::Job => self.poll_script_job(working).await,
        }
    }

    async fn poll_signal_file(
        &self,
        working: &mut WorkingCopy,
        driver: &Driver,
    ) -> Result<Option<Duration>, ControllerError> {
        let local = self.result_path(working.namespace(), working.name());
        let args = vec![
            "scp".to_string(),
            format!("{}@{}:{}", driver.ssh_user(), working.name(), REMOTE_RESULT_PATH),
            local.display().to_string(),
        ];

        let fetched = match self.runner.run(&args, self.config.command_timeout).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                debug!(machine = %working.key(), "Script result not available yet: {}", output.failure_message());
                false
            }
            Err(e) => {
                debug!(machine = %working.key(), "Script result not available yet: {}", e);
                false
            }
        };
        if !fetched {
            working.conditions_mut().mark_false(
                ConditionType::ClusterOperationComplete,
                reasons::WAITING_FOR_SCRIPT_COMPLETION,
                ConditionSeverity::Info,
                "waiting for script completion",
            );
            return Ok(Some(self.config.script_poll_interval));
        }

        let contents = tokio::fs::read_to_string(&local).await;
        match tokio::fs::remove_file(&local).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %local.display(), "Failed to remove script result: {}", e),
        }

        match parse_exit_code(&contents?) {
            Some(0) => {
                info!(machine = %working.key(), "Startup script completed");
                working
                    .conditions_mut()
                    .mark_true(ConditionType::ClusterOperationComplete);
                Ok(None)
            }
            code => {
                let message = match code {
                    Some(code) => format!("startup script exited with code {code}"),
                    None => "startup script result is not an exit code".to_string(),
                };
                Err(self.fail_cluster_operation(working, message))
            }
        }
    }

    async fn poll_script_job(&self, working: &mut WorkingCopy) -> Result<Option<Duration>, ControllerError> {
        let Some(script_ref) = working.machine.spec.script_ref.clone() else {
            return Ok(None);
        };
        let namespace = script_ref.namespace_or(working.namespace()).to_string();
        let job_name = ScriptJobSpec::job_name_for(working.name());

        let outcome = match self.jobs.job_outcome(&namespace, &job_name).await? {
            Some(outcome) => outcome,
            None => {
                let data = self.secrets.get(&namespace, &script_ref.name).await?;
                let Some((key, _)) = data.as_ref().and_then(first_entry) else {
                    return Err(ControllerError::SecretNotReady(format!(
                        "script secret {namespace}/{} has no script",
                        script_ref.name
                    )));
                };
                self.jobs
                    .ensure_job(&ScriptJobSpec {
                        namespace: namespace.clone(),
                        job_name: job_name.clone(),
                        machine_name: working.name().to_string(),
                        secret_name: script_ref.name.clone(),
                        script_key: key.to_string(),
                    })
                    .await?;
                JobOutcome::Running
            }
        };

        match outcome {
            JobOutcome::Succeeded => {
                info!(machine = %working.key(), job = %job_name, "Startup script Job succeeded");
                working
                    .conditions_mut()
                    .mark_true(ConditionType::ClusterOperationComplete);
                Ok(None)
            }
            JobOutcome::Failed => Err(self.fail_cluster_operation(
                working,
                format!("startup script Job {namespace}/{job_name} failed"),
            )),
            JobOutcome::Running => {
                working.conditions_mut().mark_false(
                    ConditionType::ClusterOperationComplete,
                    reasons::WAITING_FOR_SCRIPT_RUN,
                    ConditionSeverity::Info,
                    "waiting for script job to finish",
                );
                Ok(Some(self.config.script_poll_interval))
            }
        }
    }

    fn fail_cluster_operation(&self, working: &mut WorkingCopy, message: String) -> ControllerError {
        warn!(machine = %working.key(), "{}", message);
        working.conditions_mut().mark_false(
            ConditionType::ClusterOperationComplete,
            reasons::CLUSTER_OPERATION_FAILED,
            ConditionSeverity::Error,
            message.clone(),
        );
        ControllerError::ScriptFailed(message)
    }
}

/// First line of `contents` that parses as an integer.
pub(crate) fn parse_exit_code(contents: &str) -> Option<i64> {
    contents.lines().find_map(|line| line.trim().parse().ok())
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod poller_test;
