//! Controller-specific error types.
//!
//! Errors fall into three groups: things that are not ready yet and will
//! resolve on their own (a missing secret), failures of a provisioning step,
//! and configuration problems that recur until the Machine spec is fixed.

use azure_client::AzureError;
use ec2_client::Ec2Error;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Machine Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// EC2 API error
    #[error("EC2 error: {0}")]
    Ec2(#[from] Ec2Error),

    /// Azure Resource Manager error
    #[error("Azure error: {0}")]
    Azure(#[from] AzureError),

    /// Referenced secret missing or lacking usable data
    #[error("Secret not ready: {0}")]
    SecretNotReady(String),

    /// Cloud network prerequisites not usable yet
    #[error("Network not available: {0}")]
    NetworkNotAvailable(String),

    /// docker-machine exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// docker-machine did not finish before its deadline
    #[error("Command timed out after {0}s")]
    CommandTimeout(u64),

    /// Startup script reported a failure
    #[error("Startup script failed: {0}")]
    ScriptFailed(String),

    /// Required Machine parameter is not set
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object changed since it was read; the write was rejected
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A step failed and undoing its partial work failed as well
    #[error("{source}; compensation failed: {compensation}")]
    Compensated {
        source: Box<ControllerError>,
        compensation: Box<ControllerError>,
    },

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Join a step failure with the failure of its compensating action.
    pub fn compensated(source: impl Into<ControllerError>, compensation: impl Into<ControllerError>) -> Self {
        Self::Compensated {
            source: Box::new(source.into()),
            compensation: Box::new(compensation.into()),
        }
    }

    /// Transient condition expected to clear without user action.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::SecretNotReady(_) | Self::NetworkNotAvailable(_))
    }

    /// Error that keeps recurring until the Machine spec changes.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingParameter(_) | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_classification() {
        assert!(ControllerError::SecretNotReady("auth".into()).is_not_ready());
        assert!(ControllerError::NetworkNotAvailable("vpc".into()).is_not_ready());
        assert!(!ControllerError::CommandFailed("exit 1".into()).is_not_ready());
        assert!(ControllerError::MissingParameter("amazonec2-region".into()).is_configuration());
    }

    #[test]
    fn test_compensated_message_joins_both_errors() {
        let err = ControllerError::compensated(
            Ec2Error::NotFound("route table".into()),
            Ec2Error::DependencyViolation("igw-1".into()),
        );
        let message = err.to_string();
        assert!(message.contains("route table"), "{message}");
        assert!(message.contains("compensation failed"), "{message}");
        assert!(message.contains("igw-1"), "{message}");
    }
}
