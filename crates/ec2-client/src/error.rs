//! EC2 client errors
//!
//! Errors are classified by the AWS error code returned from the service
//! rather than by matching on rendered messages.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

/// Errors that can occur when managing EC2 network resources
#[derive(Debug, Error)]
pub enum Ec2Error {
    /// Resource does not exist (safe to skip during teardown)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource still has dependents (e.g. a subnet with live ENIs)
    #[error("Resource has dependent objects: {0}")]
    DependencyViolation(String),

    /// Association or route is already in place
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    Throttled(String),

    /// Resource did not reach the expected state in time
    #[error("Timed out waiting for {resource} to become {state}")]
    Timeout {
        resource: String,
        state: &'static str,
    },

    /// A successful response lacked a field we rely on
    #[error("Missing field in EC2 response: {0}")]
    MissingField(&'static str),

    /// Any other SDK error
    #[error("EC2 error ({}): {message}", code.as_deref().unwrap_or("unknown"))]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl Ec2Error {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Ec2Error::NotFound(_))
    }

    /// Check if the requested association already holds
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Ec2Error::AlreadyExists(_))
    }

    /// Check if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Ec2Error::DependencyViolation(_) | Ec2Error::Throttled(_) | Ec2Error::Timeout { .. }
        )
    }
}

/// AWS error codes meaning the resource is already gone
pub const NOT_FOUND_CODES: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidRoute.NotFound",
    "InvalidGroup.NotFound",
    "Gateway.NotAttached",
];

/// AWS error codes meaning the attachment or route is already present
pub const ALREADY_EXISTS_CODES: &[&str] = &["Resource.AlreadyAssociated", "RouteAlreadyExists"];

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Classify an AWS error by code.
pub fn classify_ec2_error(code: Option<&str>, message: Option<&str>) -> Ec2Error {
    let message = message.unwrap_or("Unknown error").to_string();
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => Ec2Error::NotFound(message),
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => Ec2Error::AlreadyExists(message),
        Some(c) if THROTTLING_CODES.contains(&c) => Ec2Error::Throttled(message),
        Some("DependencyViolation") => Ec2Error::DependencyViolation(message),
        _ if message.contains("does not exist") => Ec2Error::NotFound(message),
        _ => Ec2Error::Sdk {
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Convert an SDK operation error into an [`Ec2Error`].
pub(crate) fn from_sdk<E>(err: &E) -> Ec2Error
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.message() {
        Some(message) => classify_ec2_error(err.code(), Some(message)),
        None => classify_ec2_error(err.code(), Some(&DisplayErrorContext(err).to_string())),
    }
}
