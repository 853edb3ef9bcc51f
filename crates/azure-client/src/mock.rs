//! Mock ResourceGroupClient for unit testing

use crate::azure_trait::ResourceGroupClientTrait;
use crate::error::AzureError;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// In-memory resource groups with a call log
#[derive(Debug, Clone, Default)]
pub struct MockResourceGroupClient {
    groups: Arc<Mutex<BTreeSet<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    fail_delete: Arc<Mutex<Option<u16>>>,
}

impl MockResourceGroupClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource group (for test setup)
    pub fn add_group(&self, name: &str) {
        self.groups.lock().unwrap().insert(name.to_string());
    }

    /// Make every deletion fail with the given HTTP status
    pub fn fail_deletes_with(&self, status: u16) {
        *self.fail_delete.lock().unwrap() = Some(status);
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.lock().unwrap().contains(name)
    }

    /// Names passed to `delete_resource_group`, in call order
    pub fn delete_calls(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ResourceGroupClientTrait for MockResourceGroupClient {
    fn subscription_id(&self) -> &str {
        "mock-subscription"
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool, AzureError> {
        Ok(self.has_group(name))
    }

    async fn delete_resource_group(&self, name: &str) -> Result<(), AzureError> {
        self.deleted.lock().unwrap().push(name.to_string());
        if let Some(status) = *self.fail_delete.lock().unwrap() {
            return Err(AzureError::Api {
                status,
                message: "injected failure".to_string(),
            });
        }
        if self.groups.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(AzureError::NotFound(format!("resource group {name}")))
        }
    }
}
