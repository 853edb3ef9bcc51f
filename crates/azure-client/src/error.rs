//! Azure client errors

use thiserror::Error;

/// Errors that can occur when talking to Azure Resource Manager
#[derive(Debug, Error)]
pub enum AzureError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ARM returned a non-success status
    #[error("Azure API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Token request was rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Long-running operation did not finish in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Missing or invalid credential fields
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl AzureError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        match self {
            AzureError::NotFound(_) => true,
            AzureError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}
