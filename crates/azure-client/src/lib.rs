//! Azure Resource Manager Client
//!
//! Minimal ARM client used to remove the resource group docker-machine
//! creates for Azure hosts.

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod azure_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use azure_trait::ResourceGroupClientTrait;
pub use client::{AzureCredentials, ResourceGroupClient};
pub use error::AzureError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockResourceGroupClient;
