//! docker-machine invocation

use crate::error::ControllerError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short description of a failed run for conditions and errors.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        let code = self
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        if stderr.is_empty() {
            format!("exit status {code}")
        } else {
            format!("exit status {code}: {stderr}")
        }
    }
}

/// Runs the provisioning tool with a deadline.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with `args`, killing the process if it outlives `timeout`.
    ///
    /// A non-zero exit is reported through [`CommandOutput`], not as an error.
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, ControllerError>;
}

/// Runs a local docker-machine binary
#[derive(Debug, Clone)]
pub struct DockerMachine {
    binary: String,
}

impl DockerMachine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for DockerMachine {
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, ControllerError> {
        debug!(binary = %self.binary, ?args, "Running command");
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_elapsed| ControllerError::CommandTimeout(timeout.as_secs()))??;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
