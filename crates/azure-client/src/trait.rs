//! ResourceGroupClient trait for mocking

use crate::error::AzureError;

/// Resource group operations used during machine teardown.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceGroupClientTrait: Send + Sync {
    /// Subscription the client operates on
    fn subscription_id(&self) -> &str;

    /// Whether the resource group exists
    async fn resource_group_exists(&self, name: &str) -> Result<bool, AzureError>;

    /// Delete the resource group and wait until it is gone.
    ///
    /// Returns [`AzureError::NotFound`] when the group does not exist.
    async fn delete_resource_group(&self, name: &str) -> Result<(), AzureError>;
}
